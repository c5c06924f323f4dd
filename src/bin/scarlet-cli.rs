use std::io::{self, BufRead, Write};

use scarlet::{Client, Config, RespValue, ScarletError};

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let mut config = Config::default();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--host" | "-h" => {
                if i + 1 < args.len() {
                    config.host = args[i + 1].clone();
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    if let Ok(p) = args[i + 1].parse() {
                        config.port = p;
                    }
                    i += 1;
                }
            }
            "--auth" | "-a" => {
                if i + 1 < args.len() {
                    config.password = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    let addr = config.addr();
    let client = match Client::connect(config).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Could not connect to {addr}: {e}");
            return Ok(());
        }
    };
    eprintln!("Connected to {addr}");

    let stdin = io::stdin();
    let mut reader = stdin.lock();

    loop {
        print!("scarlet> ");
        io::stdout().flush()?;

        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            break; // EOF
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (cmd, args) = tokens.split_first().unwrap();
        let cmd_upper = cmd.to_uppercase();

        // SUBSCRIBE gets a streaming loop instead of a one-shot reply.
        if cmd_upper == "SUBSCRIBE" || cmd_upper == "PSUBSCRIBE" {
            if let Some(name) = args.first() {
                if let Err(e) = stream_messages(&client, name, cmd_upper == "PSUBSCRIBE").await {
                    eprintln!("(error) {e}");
                }
            } else {
                eprintln!("(error) channel name required");
            }
            continue;
        }

        let arg_bytes: Vec<&[u8]> = args.iter().map(|a| a.as_bytes()).collect();
        match client.execute_command(cmd, &arg_bytes).await {
            Ok(response) => print_resp_value(&response, 0),
            Err(ScarletError::Server { kind, message }) => println!("(error) {kind} {message}"),
            Err(e) => {
                eprintln!("{e}");
                if matches!(e, ScarletError::Disconnected) {
                    break;
                }
            }
        }

        if cmd_upper == "QUIT" {
            break;
        }
    }

    client.disconnect().await;
    Ok(())
}

/// Subscribe and print messages until the server or the user ends the stream.
async fn stream_messages(
    client: &Client,
    name: &str,
    pattern: bool,
) -> Result<(), ScarletError> {
    let mut sub = if pattern {
        client.psubscribe(name).await?
    } else {
        client.subscribe(name).await?
    };
    eprintln!("Subscribed to {name} (ctrl-c to quit)");
    while let Some(msg) = sub.next_message().await {
        let payload = String::from_utf8_lossy(&msg.payload);
        println!("[{}] {payload}", msg.channel);
    }
    Ok(())
}

fn print_resp_value(value: &RespValue, indent: usize) {
    let prefix = " ".repeat(indent);
    match value {
        RespValue::SimpleString(s) => println!("{prefix}{s}"),
        RespValue::Error(s) => println!("{prefix}(error) {s}"),
        RespValue::Integer(n) => println!("{prefix}(integer) {n}"),
        RespValue::BulkString(None) => println!("{prefix}(nil)"),
        RespValue::BulkString(Some(data)) => {
            let s = String::from_utf8_lossy(data);
            println!("{prefix}\"{s}\"");
        }
        RespValue::Array(None) => println!("{prefix}(nil)"),
        RespValue::Array(Some(items)) => {
            if items.is_empty() {
                println!("{prefix}(empty array)");
            } else {
                for (i, item) in items.iter().enumerate() {
                    print!("{prefix}{}) ", i + 1);
                    print_resp_value_inline(item);
                }
            }
        }
    }
}

fn print_resp_value_inline(value: &RespValue) {
    match value {
        RespValue::SimpleString(s) => println!("{s}"),
        RespValue::Error(s) => println!("(error) {s}"),
        RespValue::Integer(n) => println!("(integer) {n}"),
        RespValue::BulkString(None) => println!("(nil)"),
        RespValue::BulkString(Some(data)) => {
            let s = String::from_utf8_lossy(data);
            println!("\"{s}\"");
        }
        RespValue::Array(None) => println!("(nil)"),
        RespValue::Array(Some(items)) => {
            if items.is_empty() {
                println!("(empty array)");
            } else {
                println!();
                for (i, item) in items.iter().enumerate() {
                    print!("   {}) ", i + 1);
                    print_resp_value_inline(item);
                }
            }
        }
    }
}
