use std::time::Instant;

use bytes::BytesMut;
use scarlet::resp::{encode_command, RespParser, RespValue};

fn bench_encode(iterations: usize) -> f64 {
    let start = Instant::now();
    let mut total = 0usize;
    for i in 0..iterations {
        let key = format!("bench_key_{i}");
        let frame = encode_command("SET", &[key.as_bytes(), b"value"]);
        total += frame.len();
    }
    assert!(total > 0);
    iterations as f64 / start.elapsed().as_secs_f64()
}

fn bench_parse_bulk(iterations: usize) -> f64 {
    let frame = b"$11\r\nhello world\r\n";
    let mut wire = BytesMut::with_capacity(frame.len() * iterations);
    for _ in 0..iterations {
        wire.extend_from_slice(frame);
    }

    let start = Instant::now();
    let mut count = 0usize;
    while let Some(v) = RespParser::parse(&mut wire).unwrap() {
        assert!(matches!(v, RespValue::BulkString(Some(_))));
        count += 1;
    }
    assert_eq!(count, iterations);
    iterations as f64 / start.elapsed().as_secs_f64()
}

fn bench_parse_nested(iterations: usize) -> f64 {
    let frame = b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$12\r\nhello\r\nworld\r\n";
    let mut wire = BytesMut::with_capacity(frame.len() * iterations);
    for _ in 0..iterations {
        wire.extend_from_slice(frame);
    }

    let start = Instant::now();
    let mut count = 0usize;
    while let Some(v) = RespParser::parse(&mut wire).unwrap() {
        assert!(matches!(v, RespValue::Array(Some(_))));
        count += 1;
    }
    assert_eq!(count, iterations);
    iterations as f64 / start.elapsed().as_secs_f64()
}

fn main() {
    let iterations = 1_000_000;

    println!("=== Scarlet codec benchmark ({iterations} operations) ===\n");

    let encode_ops = bench_encode(iterations);
    println!("encode SET:     {encode_ops:>12.0} ops/sec");

    let bulk_ops = bench_parse_bulk(iterations);
    println!("parse bulk:     {bulk_ops:>12.0} ops/sec");

    let nested_ops = bench_parse_nested(iterations);
    println!("parse message:  {nested_ops:>12.0} ops/sec");

    println!("\n=== Done ===");
}
