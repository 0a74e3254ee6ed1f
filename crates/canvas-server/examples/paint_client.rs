//! Interactive canvas client.
//!
//! Connects, prints the snapshot size, then reads `x y color` lines from
//! stdin and sends each as a pixel update. Deltas that arrive shortly
//! after each send are printed.
//!
//! ```text
//! CANVAS_CLIENT_ADDR=127.0.0.1:8080 cargo run -p canvas-server --example paint_client
//! ```

use std::env;
use std::error::Error;
use std::io::{self, Write};
use std::time::Duration;

use canvas_core::PixelUpdate;
use canvas_protocol::binary_codec::{decode_snapshot, encode_pixel_updates};
use canvas_protocol::handshake::find_header_end;
use canvas_protocol::{
    decode_delta, decode_frame, encode_masked_frame, upgrade_request, Decoded, Frame, Opcode,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const KEY: &str = "x3JJHMbDL1EzLkh9GBhXDw==";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let addr = env::var("CANVAS_CLIENT_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    println!("Connecting to {}...", addr);
    let mut stream = TcpStream::connect(&addr).await?;
    stream.write_all(&upgrade_request(&addr, "/", KEY)).await?;

    let mut buf = Vec::new();
    let end = loop {
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
        read_more(&mut stream, &mut buf).await?;
    };
    let head = String::from_utf8_lossy(&buf[..end]).to_string();
    buf.drain(..end);
    if !head.starts_with("HTTP/1.1 101") {
        return Err(format!("upgrade refused: {}", head.lines().next().unwrap_or("")).into());
    }

    let frame = next_frame(&mut stream, &mut buf).await?;
    let snapshot = decode_snapshot(&frame.payload)?;
    println!("Connected. Canvas is {}x{}.", snapshot.width, snapshot.height);
    println!("Type `x y color` to paint, 'quit' to leave.\n");

    let stdin = io::stdin();
    loop {
        print!(">> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            println!("\nEOF on stdin, exiting client.");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            let mut close = Vec::new();
            encode_masked_frame(Opcode::Close, &1000u16.to_be_bytes(), rand_key(), &mut close);
            stream.write_all(&close).await?;
            println!("Exiting client.");
            break;
        }

        let update = match parse_update(trimmed) {
            Some(u) => u,
            None => {
                eprintln!("Expected three numbers: x y color");
                continue;
            }
        };

        let mut payload = Vec::new();
        encode_pixel_updates(&[update], &mut payload);
        let mut wire = Vec::new();
        encode_masked_frame(Opcode::Binary, &payload, rand_key(), &mut wire);
        stream.write_all(&wire).await?;

        // Print whatever deltas arrive within one broadcast period.
        while let Ok(frame) = timeout(Duration::from_millis(750), next_frame(&mut stream, &mut buf)).await {
            let frame = frame?;
            if frame.kind() != Some(Opcode::Text) {
                continue;
            }
            let delta = decode_delta(&frame.payload)?;
            println!(
                "<< {} clients, {} updated pixels",
                delta.client_count,
                delta.updated_pixel.len()
            );
            if delta.updated_pixel.contains(&update) {
                break;
            }
        }
    }

    Ok(())
}

fn parse_update(line: &str) -> Option<PixelUpdate> {
    let mut parts = line.split_whitespace().map(str::parse::<u16>);
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(Ok(x)), Some(Ok(y)), Some(Ok(c)), None) => Some(PixelUpdate::new(x, y, u8::try_from(c).ok()?)),
        _ => None,
    }
}

/// Demo-grade masking key taken from the clock.
fn rand_key() -> [u8; 4] {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0x5eed);
    nanos.to_le_bytes()
}

async fn read_more(stream: &mut TcpStream, buf: &mut Vec<u8>) -> Result<(), Box<dyn Error>> {
    let mut chunk = [0u8; 8192];
    let n = stream.read(&mut chunk).await?;
    if n == 0 {
        return Err("server closed the connection".into());
    }
    buf.extend_from_slice(&chunk[..n]);
    Ok(())
}

async fn next_frame(stream: &mut TcpStream, buf: &mut Vec<u8>) -> Result<Frame, Box<dyn Error>> {
    loop {
        if let Decoded::Complete { frame, consumed } = decode_frame(buf)? {
            buf.drain(..consumed);
            return Ok(frame);
        }
        read_more(stream, buf).await?;
    }
}
