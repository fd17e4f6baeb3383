//! Line-oriented console for driving a rig session
//!
//! Stands in for the graphical presentation layer: it only forwards raw
//! events into the session core and prints what the core reports.

use std::path::PathBuf;

use color_eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use steprig::link::available_ports;
use steprig::mapping::{KeyDirection, PointerSample};
use steprig::session::{InputEvent, SessionHandle};
use steprig::RigSettings;

/// Surface size assumed when a pointer command omits one
const DEFAULT_SURFACE: f32 = 400.0;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings = load_settings()?;
    info!("Starting rig console with settings: {:?}", settings);
    let mut session = SessionHandle::spawn(settings.clone());

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        let args: Vec<&str> = parts.collect();

        match command {
            "ports" => match available_ports() {
                Ok(ports) if ports.is_empty() => println!("no serial ports found"),
                Ok(ports) => ports.iter().for_each(|p| println!("{p}")),
                Err(e) => println!("error: {e}"),
            },
            "connect" => match args.first() {
                Some(port) => report(session.connect(port).await),
                None => println!("usage: connect <port>"),
            },
            "disconnect" => report(session.disconnect().await),
            "pointer" => match parse_pointer(&args) {
                Ok(sample) => report(session.input(InputEvent::PointerMoved(sample)).await),
                Err(usage) => println!("{usage}"),
            },
            "leave" => report(session.input(InputEvent::PointerLeft).await),
            "press" => match parse_direction(&args) {
                Ok(key) => report(session.input(InputEvent::KeyPressed(key)).await),
                Err(usage) => println!("{usage}"),
            },
            "release" => match parse_direction(&args) {
                Ok(key) => report(session.input(InputEvent::KeyReleased(key)).await),
                Err(usage) => println!("{usage}"),
            },
            "stop" => report(session.input(InputEvent::StopRequested).await),
            "speed" => {
                let raw = args
                    .first()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| settings.default_speed.to_string());
                match session.set_speed(&raw).await {
                    Ok(value) => println!("speed set to {value}"),
                    Err(e) => println!("error: {e}"),
                }
            }
            "status" => match session.status().await {
                Ok(status) => {
                    println!(
                        "{:?} port={} last_token={} sent={}",
                        status.connection_state,
                        status.port.as_deref().unwrap_or("-"),
                        status
                            .last_token
                            .map(|t| t.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        status.commands_sent,
                    );
                    for message in &status.error_messages {
                        println!("  error: {message}");
                    }
                }
                Err(e) => println!("error: {e}"),
            },
            "help" => print_help(),
            "quit" | "exit" => break,
            other => println!("unknown command: {other} (try 'help')"),
        }
    }

    session.shutdown().await;
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();
    Ok(())
}

/// Optional first argument names a toml settings file
fn load_settings() -> Result<RigSettings> {
    match std::env::args().nth(1) {
        Some(path) => Ok(RigSettings::load(&PathBuf::from(path))?),
        None => Ok(RigSettings::default()),
    }
}

fn parse_pointer(args: &[&str]) -> Result<PointerSample, &'static str> {
    const USAGE: &str = "usage: pointer <x> <y> [width height]";
    let x: f32 = args.first().and_then(|s| s.parse().ok()).ok_or(USAGE)?;
    let y: f32 = args.get(1).and_then(|s| s.parse().ok()).ok_or(USAGE)?;
    let width: f32 = match args.get(2) {
        Some(raw) => raw.parse().map_err(|_| USAGE)?,
        None => DEFAULT_SURFACE,
    };
    let height: f32 = match args.get(3) {
        Some(raw) => raw.parse().map_err(|_| USAGE)?,
        None => DEFAULT_SURFACE,
    };
    Ok(PointerSample::from_surface(x, y, width, height))
}

fn parse_direction(args: &[&str]) -> Result<KeyDirection, &'static str> {
    const USAGE: &str = "usage: press|release <up|down|left|right>";
    match args.first().copied() {
        Some("up") => Ok(KeyDirection::Up),
        Some("down") => Ok(KeyDirection::Down),
        Some("left") => Ok(KeyDirection::Left),
        Some("right") => Ok(KeyDirection::Right),
        _ => Err(USAGE),
    }
}

fn report(result: Result<(), steprig::SessionError>) {
    match result {
        Ok(()) => println!("ok"),
        Err(e) => println!("error: {e}"),
    }
}

fn print_help() {
    println!("commands:");
    println!("  ports                        list serial ports");
    println!("  connect <port>               open the controller link");
    println!("  disconnect                   safety-stop and close the link");
    println!("  pointer <x> <y> [w h]        feed a pointer sample");
    println!("  leave                        pointer left the surface");
    println!("  press|release <direction>    directional key edges");
    println!("  stop                         release all motion");
    println!("  speed [value]                transmit a speed setting");
    println!("  status                       show session status");
    println!("  quit                         exit");
}
