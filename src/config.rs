/// Client connection options.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Password sent via AUTH before the connection is considered ready.
    pub password: Option<String>,
    /// Username for AUTH with ACLs (Redis 6+). Ignored unless `password` is set.
    pub username: Option<String>,
    /// Advisory pending-queue watermark. When the number of in-flight
    /// requests crosses it a warning is logged; writes are never gated.
    /// 0 disables the check.
    pub pipeline_watermark: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            username: None,
            pipeline_watermark: 0,
        }
    }
}

impl Config {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Config {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
