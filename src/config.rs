use std::{fs::read_to_string, net::SocketAddr, path::PathBuf, str::FromStr};

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Stream media packets to the receiver endpoint.
    Sender,
    /// Bind the receiver endpoint and reassemble the stream.
    Receiver,
    /// Run both halves in one process, wired over loopback.
    Both,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "sender" => Self::Sender,
            "receiver" => Self::Receiver,
            "both" => Self::Both,
            _ => return Err(format!("unknown mode: {value}")),
        })
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::Both
    }
}

impl Mode {
    pub fn is_sender(&self) -> bool {
        matches!(self, Self::Sender | Self::Both)
    }

    pub fn is_receiver(&self) -> bool {
        matches!(self, Self::Receiver | Self::Both)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Net {
    ///
    /// sender bind address
    ///
    /// The address the sender's socket binds to. Port zero lets the OS
    /// pick; the receiver learns the effective address from the first
    /// datagram it sees and directs NACKs there.
    ///
    #[serde(default = "Net::sender")]
    pub sender: SocketAddr,
    ///
    /// receiver endpoint
    ///
    /// Where the receiver listens and where the sender directs media
    /// when no middlebox sits in between.
    ///
    #[serde(default = "Net::receiver")]
    pub receiver: SocketAddr,
    ///
    /// receiver listen address behind the middlebox
    ///
    /// When the network simulator is enabled the middlebox takes over
    /// the receiver endpoint and forwards the impaired stream here.
    ///
    #[serde(default = "Net::receiver_listen")]
    pub receiver_listen: SocketAddr,
}

impl Net {
    fn sender() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn receiver() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    fn receiver_listen() -> SocketAddr {
        "127.0.0.1:6000".parse().unwrap()
    }
}

impl Default for Net {
    fn default() -> Self {
        Self {
            sender: Self::sender(),
            receiver: Self::receiver(),
            receiver_listen: Self::receiver_listen(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Stream {
    ///
    /// seconds between two media packets
    ///
    #[serde(default = "Stream::interval")]
    pub interval: f64,
    ///
    /// seconds to stream before stopping
    ///
    #[serde(default = "Stream::duration")]
    pub duration: f64,
    ///
    /// media timestamp advance per packet
    ///
    /// 160 samples is one 20ms frame at 8kHz.
    ///
    #[serde(default = "Stream::timestamp_increment")]
    pub timestamp_increment: u32,
    ///
    /// media packets per XOR parity group
    ///
    #[serde(default = "Stream::fec_group_size")]
    pub fec_group_size: usize,
    ///
    /// sender retransmission history capacity, in packets
    ///
    #[serde(default = "Stream::history_size")]
    pub history_size: usize,
    ///
    /// receiver reorder buffer capacity, in packets
    ///
    #[serde(default = "Stream::buffer_size")]
    pub buffer_size: usize,
    ///
    /// seconds to suppress repeated NACKs for the same sequence number
    ///
    #[serde(default = "Stream::nack_timeout")]
    pub nack_timeout: f64,
}

impl Stream {
    fn interval() -> f64 {
        0.02
    }

    fn duration() -> f64 {
        10.0
    }

    fn timestamp_increment() -> u32 {
        160
    }

    fn fec_group_size() -> usize {
        4
    }

    fn history_size() -> usize {
        1000
    }

    fn buffer_size() -> usize {
        1000
    }

    fn nack_timeout() -> f64 {
        0.1
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self {
            interval: Self::interval(),
            duration: Self::duration(),
            timestamp_increment: Self::timestamp_increment(),
            fec_group_size: Self::fec_group_size(),
            history_size: Self::history_size(),
            buffer_size: Self::buffer_size(),
            nack_timeout: Self::nack_timeout(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Audio {
    ///
    /// WAV file to stream
    ///
    /// 16-bit signed little-endian PCM, mono, 8kHz. Without it the
    /// sender emits synthetic placeholder payloads.
    ///
    #[serde(default)]
    pub input: Option<PathBuf>,
    ///
    /// WAV file the receiver writes
    ///
    #[serde(default = "Audio::output")]
    pub output: PathBuf,
}

impl Audio {
    fn output() -> PathBuf {
        PathBuf::from("received.wav")
    }
}

impl Default for Audio {
    fn default() -> Self {
        Self {
            input: None,
            output: Self::output(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Simulator {
    ///
    /// route traffic through the impairment middlebox
    ///
    #[serde(default)]
    pub enabled: bool,
    ///
    /// middlebox listen address
    ///
    /// The sender targets this address instead of the receiver endpoint
    /// when the simulator is enabled.
    ///
    #[serde(default = "Simulator::listen")]
    pub listen: SocketAddr,
    #[serde(default = "Simulator::drop_rate")]
    pub drop_rate: f64,
    ///
    /// upper bound of the random forwarding delay, in seconds
    ///
    #[serde(default = "Simulator::max_delay")]
    pub max_delay: f64,
    #[serde(default = "Simulator::reorder_rate")]
    pub reorder_rate: f64,
    #[serde(default = "Simulator::duplicate_rate")]
    pub duplicate_rate: f64,
}

impl Simulator {
    fn listen() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    fn drop_rate() -> f64 {
        0.1
    }

    fn max_delay() -> f64 {
        0.05
    }

    fn reorder_rate() -> f64 {
        0.2
    }

    fn duplicate_rate() -> f64 {
        0.05
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: Self::listen(),
            drop_rate: Self::drop_rate(),
            max_delay: Self::max_delay(),
            reorder_rate: Self::reorder_rate(),
            duplicate_rate: Self::duplicate_rate(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Log {
    ///
    /// log level
    ///
    /// An enum representing the available verbosity levels of the logger.
    ///
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub net: Net,
    #[serde(default)]
    pub stream: Stream,
    #[serde(default)]
    pub audio: Audio,
    #[serde(default)]
    pub simulator: Simulator,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    ///
    /// Specify the configuration file path
    ///
    /// A JSON object; unknown keys are rejected. Command line options
    /// override the file.
    ///
    /// Example: rtp-stream --config ./rtp-stream.json
    ///
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Operation mode: sender, receiver or both
    #[arg(long)]
    mode: Option<Mode>,
    /// Sender socket bind address
    #[arg(long)]
    sender: Option<SocketAddr>,
    /// Receiver endpoint
    #[arg(long)]
    receiver: Option<SocketAddr>,
    /// Seconds to stream before stopping
    #[arg(long)]
    duration: Option<f64>,
    /// Seconds between two media packets
    #[arg(long)]
    interval: Option<f64>,
    /// WAV file to stream instead of synthetic payloads
    #[arg(long)]
    audio: Option<PathBuf>,
    /// Route traffic through the impairment middlebox
    #[arg(long)]
    simulate_network: bool,
    /// Port the middlebox listens on
    #[arg(long)]
    middlebox_port: Option<u16>,
    /// Log level: error, warn, info, debug or trace
    #[arg(long)]
    log_level: Option<LogLevel>,
}

impl Config {
    ///
    /// Load configure from config file and command line parameters.
    ///
    /// Load command line parameters, if the configuration file path is specified,
    /// the configuration is read from the configuration file, otherwise the
    /// default configuration is used.
    ///
    pub fn load() -> Result<Self> {
        let cli = Cli::parse();

        let mut config = match &cli.config {
            Some(path) => serde_json5::from_str::<Self>(&read_to_string(path)?)?,
            None => Self::default(),
        };

        if let Some(mode) = cli.mode {
            config.mode = mode;
        }

        if let Some(sender) = cli.sender {
            config.net.sender = sender;
        }

        if let Some(receiver) = cli.receiver {
            config.net.receiver = receiver;
        }

        if let Some(duration) = cli.duration {
            config.stream.duration = duration;
        }

        if let Some(interval) = cli.interval {
            config.stream.interval = interval;
        }

        if let Some(audio) = cli.audio {
            config.audio.input = Some(audio);
        }

        if cli.simulate_network {
            config.simulator.enabled = true;
        }

        if let Some(port) = cli.middlebox_port {
            config.simulator.listen.set_port(port);
        }

        if let Some(level) = cli.log_level {
            config.log.level = level;
        }

        Ok(config)
    }
}
