use clap::{Parser, Subcommand};
use client::{MasterClient, RoomClient};
use log::{info, warn};
use shared::logging::init_logger;
use shared::{Packet, RoomId, DEFAULT_VERSION_KEY};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Master client address
    #[arg(short = 'm', long, default_value = "127.0.0.1:8080")]
    master: String,

    /// Version key shared with the master
    #[arg(short = 'k', long, default_value = DEFAULT_VERSION_KEY)]
    version_key: String,

    /// Region to create rooms in or list rooms for
    #[arg(short = 'r', long, default_value = "EU")]
    region: String,

    /// Also write logs to this file
    #[arg(long)]
    log: Option<PathBuf>,

    /// Chat line to send once inside a room
    #[arg(long)]
    message: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List rooms in the region
    List,
    /// Create a room and stay in it
    Create,
    /// Join an existing room and stay in it
    Join { room_id: RoomId },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logger(args.log.as_deref());

    let mut master = MasterClient::connect(&args.master, &args.version_key).await?;

    let grant = match args.command {
        Command::List => {
            let rooms = master.list_rooms(&args.region).await?;
            println!("{} room(s) in {}", rooms.len(), args.region);
            for room in rooms {
                println!(
                    "  {:>20}  {:<16} {}/{}",
                    room.id, room.name, room.player_count, room.player_max
                );
            }
            master.close();
            return Ok(());
        }
        Command::Create => master.create_room(&args.region).await?,
        Command::Join { room_id } => master.join_room(room_id).await?,
    };
    master.close();

    let mut room = RoomClient::enter(&grant).await?;
    let room_id = room.room_id();
    println!("In room {} on {}", room_id, grant.node_address);

    if let Some(message) = &args.message {
        room.chat(message);
    }

    loop {
        tokio::select! {
            packet = room.recv() => match packet? {
                Some(Packet::Chat { message }) => println!("> {}", message),
                Some(other) => warn!("Ignoring {:?}", other),
                None => {
                    info!("Node closed the connection");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Leaving room {}", room_id);
                break;
            }
        }
    }

    room.leave();
    Ok(())
}
