//! Headless client that finds a game and steers its paddle towards the ball.

use bincode::{deserialize, serialize};
use clap::Parser;
use log::{debug, info, warn};
use shared::{GameSettings, Packet, PlayerId, Side, Status, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::interval;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Identity to connect with
    #[arg(short = 'i', long, default_value = "1")]
    player_id: PlayerId,

    /// Play against the server's computer opponent
    #[arg(short = 'c', long)]
    computer: bool,
}

/// Which key the bot is holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hold {
    Up,
    Down,
    Nothing,
}

impl Hold {
    fn key(self) -> Option<&'static str> {
        match self {
            Hold::Up => Some("up"),
            Hold::Down => Some("down"),
            Hold::Nothing => None,
        }
    }
}

struct Bot {
    socket: UdpSocket,
    server: SocketAddr,
    settings: GameSettings,
    side: Side,
    hold: Hold,
}

impl Bot {
    async fn send(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        self.socket.send_to(&serialize(packet)?, self.server).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Packet, Box<dyn std::error::Error>> {
        let mut buffer = [0u8; 2048];
        let (len, _) = self.socket.recv_from(&mut buffer).await?;
        Ok(deserialize(&buffer[..len])?)
    }

    /// Swaps the held key, releasing the previous one first.
    async fn hold(&mut self, hold: Hold) -> Result<(), Box<dyn std::error::Error>> {
        if hold == self.hold {
            return Ok(());
        }
        if let Some(key) = self.hold.key() {
            self.send(&Packet::Input {
                key: key.to_string(),
                pressed: false,
            })
            .await?;
        }
        if let Some(key) = hold.key() {
            self.send(&Packet::Input {
                key: key.to_string(),
                pressed: true,
            })
            .await?;
        }
        self.hold = hold;
        Ok(())
    }

    fn choose(&self, paddle_top: f64, ball_y: f64) -> Hold {
        let centre = paddle_top + self.settings.paddle_height / 2.0;
        let offset = ball_y - centre;
        if offset.abs() < self.settings.paddle_height / 4.0 {
            Hold::Nothing
        } else if offset < 0.0 {
            Hold::Up
        } else {
            Hold::Down
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server = args.server.parse::<SocketAddr>()?;
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Bot bound to {}", socket.local_addr()?);

    let mut bot = Bot {
        socket,
        server,
        settings: GameSettings {
            computer: args.computer,
            ..GameSettings::default()
        },
        side: Side::Left,
        hold: Hold::Nothing,
    };

    bot.send(&Packet::Connect {
        client_version: PROTOCOL_VERSION,
        player_id: args.player_id,
    })
    .await?;
    bot.send(&Packet::FindGame {
        settings: bot.settings.clone(),
    })
    .await?;

    let mut heartbeat = interval(Duration::from_secs(1));

    loop {
        let packet = tokio::select! {
            packet = bot.recv() => packet?,
            _ = heartbeat.tick() => {
                bot.send(&Packet::Heartbeat).await?;
                continue;
            }
        };

        match packet {
            Packet::Connected { player_id } => info!("Connected as player {}", player_id),
            Packet::GameJoined {
                game_id,
                side,
                settings,
            } => {
                info!("Joined game {} on the {:?} side", game_id, side);
                bot.side = side;
                bot.settings = settings;
            }
            Packet::State { game_id, state } => {
                match state.status {
                    Status::Running => {
                        let paddle = match bot.side {
                            Side::Left => state.paddle_l,
                            Side::Right => state.paddle_r,
                        };
                        let hold = bot.choose(paddle, state.ball_pos.y);
                        bot.hold(hold).await?;
                    }
                    Status::Finished | Status::Aborted => {
                        info!(
                            "Game {} ended {:?}: {} - {}",
                            game_id, state.status, state.score_l, state.score_r
                        );
                        bot.send(&Packet::Disconnect).await?;
                        return Ok(());
                    }
                    Status::Pending | Status::Paused => {
                        debug!("Game {} is {:?}", game_id, state.status)
                    }
                }
            }
            Packet::Disconnected { reason } => {
                warn!("Disconnected by server: {}", reason);
                return Ok(());
            }
            other => debug!("Ignoring {:?}", other),
        }
    }
}
