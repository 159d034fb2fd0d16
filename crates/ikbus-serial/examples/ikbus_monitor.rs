//! I/K-bus Monitor
//!
//! Prints every packet seen on the bus, optionally sending one packet first.
//!
//! Usage:
//!   cargo run --example ikbus_monitor -- [OPTIONS]
//!
//! Options:
//!   --list                 Print available serial ports as JSON and exit
//!   --port PORT            Serial port (default: /dev/ttyUSB0)
//!   --send SRC DST HEX..   Send one packet before monitoring, e.g. `--send 50 68 32 11`
//!
//! Set RUST_LOG=debug for connection diagnostics.

use anyhow::{bail, Context};
use ikbus_serial::protocol::{
    list_ports, IkBusPacket, PacketReader, PacketStreamElement, PacketWriter,
    SerialPortConnection,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn parse_hex(s: &str) -> anyhow::Result<u8> {
    u8::from_str_radix(s.trim_start_matches("0x"), 16).with_context(|| format!("bad hex byte: {s}"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port_name = "/dev/ttyUSB0".to_string();
    let mut send: Option<IkBusPacket> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--list" | "-l" => {
                println!("{}", serde_json::to_string_pretty(&list_ports())?);
                return Ok(());
            }
            "--port" | "-p" => {
                i += 1;
                port_name = args.get(i).context("--port needs a value")?.clone();
            }
            "--send" | "-s" => {
                let bytes = args[i + 1..]
                    .iter()
                    .take_while(|a| !a.starts_with("--"))
                    .map(|a| parse_hex(a))
                    .collect::<anyhow::Result<Vec<u8>>>()?;
                if bytes.len() < 2 {
                    bail!("--send needs a source and a destination address");
                }
                i += bytes.len();
                send = Some(IkBusPacket::new(bytes[0], bytes[1], bytes[2..].to_vec())?);
            }
            other => bail!("unknown option: {other}"),
        }
        i += 1;
    }

    let mut conn = SerialPortConnection::open(&port_name)?;
    println!("Monitoring {} (Ctrl+C to quit)", conn.port_name());

    if let Some(packet) = send {
        let mut writer = conn.writer()?;
        writer.write(&packet)?;
        writer.close();
        println!("TX {:02X?}", packet.to_raw());
        // write only queues the bytes; give the line time before reading
        std::thread::sleep(Duration::from_millis(50));
    }

    let mut reader = conn.reader()?;
    while let Some(element) = reader.read()? {
        match element {
            PacketStreamElement::Valid { packet, .. } => println!(
                "RX {:02X} -> {:02X} {:02X?}",
                packet.source(), packet.destination(), packet.data()
            ),
            PacketStreamElement::Invalid { raw } => println!("?? {:02X?}", raw),
        }
    }

    conn.close()?;
    Ok(())
}
