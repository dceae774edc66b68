use aquabus::agent::{AgentHandle, OperatorCommand, Snapshot, Waterworks};
use aquabus::config::{LinkConfig, SimulationConfig};
use aquabus::link::TelemetryLink;
use aquabus::simulation::Control;
use aquabus::transport::{BrokerConnector, HttpSink, LogSink, MemoryConnector, RequestSink, WsConnector};
use clap::{App, Arg, ArgMatches};
use colored::*;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

const HELP_TEXT: &str = "commands: connect | disconnect | start | stop | pump | washbasin1 | washbasin2 | kitchen | shower | status | quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("aquabus")
        .version("0.1.0")
        .author("Water Systems Engineering Team")
        .about("💧 Water system telemetry bridge and tank simulator")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON file with broker URL, token and entity ids")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("ws-url")
                .long("ws-url")
                .value_name("URL")
                .help("Broker WebSocket URL (overrides AQUABUS_WS_URL)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("token")
                .long("token")
                .value_name("TOKEN")
                .help("Broker auth token (overrides AQUABUS_TOKEN)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("api-url")
                .long("api-url")
                .value_name("URL")
                .help("Broker HTTP API base (overrides AQUABUS_API_URL)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("offline")
                .long("offline")
                .help("Use an in-process broker and log outbound requests"),
        )
        .arg(
            Arg::with_name("autostart")
                .long("autostart")
                .help("Connect and start the simulation immediately"),
        )
        .get_matches();

    let link_config = load_link_config(&matches)?;
    let offline = matches.is_present("offline");

    let (connector, sink): (Box<dyn BrokerConnector>, Box<dyn RequestSink>) = if offline {
        let (connector, mut peers) = MemoryConnector::new();
        tokio::spawn(async move {
            while let Some(mut peer) = peers.recv().await {
                peer.accept();
                tokio::spawn(async move {
                    while let Some(frame) = peer.next_frame().await {
                        debug!("offline broker <- {}", frame);
                    }
                });
            }
        });
        (Box::new(connector), Box::new(LogSink::new()))
    } else {
        link_config.validate()?;
        (
            Box::new(WsConnector::new()),
            Box::new(HttpSink::new(link_config.api_url.clone(), link_config.token.clone())),
        )
    };

    println!("💧 Aquabus");
    println!("==========");
    println!(
        "   Broker: {}",
        if offline { "offline".yellow() } else { link_config.ws_url.as_str().bright_white() }
    );
    println!("   Devices configured: {}/9", link_config.entity_ids.len());
    println!("   {}", HELP_TEXT.dimmed());

    let link = TelemetryLink::new(&link_config, connector, sink);
    let mut agent = Waterworks::new(link, SimulationConfig::default());

    if matches.is_present("autostart") {
        agent.connect();
        agent.start_simulation();
    }

    let handle = agent.handle();
    tokio::spawn(read_operator_commands(handle));

    agent.run().await;
    println!("💧 Aquabus stopped");

    Ok(())
}

fn load_link_config(matches: &ArgMatches<'_>) -> Result<LinkConfig, Box<dyn std::error::Error>> {
    let mut config = match matches.value_of("config") {
        Some(path) => LinkConfig::from_file(Path::new(path))?,
        None => LinkConfig::from_env(),
    };

    if let Some(url) = matches.value_of("ws-url") {
        config.ws_url = url.to_string();
    }
    if let Some(token) = matches.value_of("token") {
        config.token = token.to_string();
    }
    if let Some(url) = matches.value_of("api-url") {
        config.api_url = url.to_string();
    }

    Ok(config)
}

async fn read_operator_commands(handle: AgentHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        };

        let word = line.trim();
        if word.is_empty() {
            continue;
        }

        let command = match word.to_ascii_lowercase().as_str() {
            "connect" => OperatorCommand::Connect,
            "disconnect" => OperatorCommand::Disconnect,
            "start" => OperatorCommand::Start,
            "stop" => OperatorCommand::Stop,
            "quit" | "exit" => break,
            "status" => {
                print_status(&handle.snapshot());
                continue;
            }
            "help" => {
                println!("{}", HELP_TEXT);
                continue;
            }
            other => match other.parse::<Control>() {
                Ok(control) => OperatorCommand::Toggle(control),
                Err(e) => {
                    println!("{} {}", "❌".red(), e.as_str().bright_red());
                    continue;
                }
            },
        };

        info!("Operator: {:?}", command);
        if !handle.send(command) {
            break;
        }
    }

    handle.send(OperatorCommand::Shutdown);
}

fn on_off(on: bool) -> ColoredString {
    if on {
        "ON ".green()
    } else {
        "OFF".red()
    }
}

fn print_status(snapshot: &Snapshot) {
    let hydraulic = &snapshot.hydraulic;

    println!("{}", "── Simulation ──".bright_cyan());
    println!(
        "   running: {}   ticks: {}   broker: {}",
        on_off(snapshot.running),
        snapshot.tick_count,
        if snapshot.connected { "connected".green() } else { "disconnected".yellow() }
    );
    println!("   underground tank: {:>8.2}", hydraulic.underground_level);
    println!("   overhead tank:    {:>8.2}", hydraulic.overhead_level);
    for control in Control::ALL {
        println!("   {:<12} {}", control.to_string(), on_off(hydraulic.is_on(control)));
    }

    if let Some(telemetry) = &snapshot.last_telemetry {
        println!(
            "   inflow: {} /min   outflow: {} /min",
            telemetry.inflow_rate.to_string().bright_white(),
            telemetry.outflow_rate.to_string().bright_white()
        );
    }

    println!("{}", "── Devices ──".bright_cyan());
    for (channel, state) in &snapshot.devices {
        let data = serde_json::to_string(&state.data).unwrap_or_default();
        let link = if state.connected { "●".green() } else { "○".dimmed() };
        println!("   {} {:<16} {}", link, channel.to_string(), data.dimmed());
    }
}
