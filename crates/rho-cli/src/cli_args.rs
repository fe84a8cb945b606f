use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use rho_engine::WorkMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliWorkMode {
    Public,
    Private,
}

impl From<CliWorkMode> for WorkMode {
    fn from(mode: CliWorkMode) -> Self {
        match mode {
            CliWorkMode::Public => Self::Public,
            CliWorkMode::Private => Self::Private,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "rho",
    about = "Session supervisor and command dispatcher for a wire messaging transport",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "RHO_ENDPOINT",
        default_value = "ws://127.0.0.1:8799/wire",
        help = "Websocket endpoint of the wire gateway."
    )]
    pub endpoint: String,

    #[arg(
        long,
        env = "RHO_STATE_DIR",
        default_value = ".rho",
        help = "Directory holding session credentials and the chat store."
    )]
    pub state_dir: PathBuf,

    #[arg(
        long,
        env = "RHO_WORK_MODE",
        value_enum,
        default_value_t = CliWorkMode::Public,
        help = "public dispatches for everyone; private only for the authenticated identity."
    )]
    pub work_mode: CliWorkMode,

    #[arg(
        long,
        env = "RHO_HANDLER_PREFIX",
        default_value = "[!/.]",
        help = "Regex character class of accepted command prefixes."
    )]
    pub handler_prefix: String,

    #[arg(
        long,
        env = "RHO_AUTO_READ",
        action = ArgAction::SetTrue,
        help = "Acknowledge every inbound message with a read receipt."
    )]
    pub auto_read: bool,

    #[arg(
        long,
        env = "RHO_AUTO_STATUS_READ",
        action = ArgAction::SetTrue,
        help = "Acknowledge status-broadcast messages with a read receipt."
    )]
    pub auto_status_read: bool,

    #[arg(
        long,
        env = "RHO_LOG_MESSAGES",
        action = ArgAction::SetTrue,
        help = "Log inbound messages that pass the paused-chat gate."
    )]
    pub log_messages: bool,

    #[arg(
        long,
        env = "RHO_GREETINGS",
        action = ArgAction::SetTrue,
        help = "Send welcome/farewell texts on group participant updates."
    )]
    pub greetings: bool,

    #[arg(
        long,
        value_delimiter = ',',
        default_value = "3000,5000,10000,20000,30000",
        help = "Reconnect backoff schedule in milliseconds; the last value repeats."
    )]
    pub backoff_ms: Vec<u64>,

    #[arg(
        long,
        default_value_t = 5,
        help = "Transient reconnect attempts before the session is cleared."
    )]
    pub max_reconnect_attempts: usize,

    #[arg(
        long,
        default_value_t = 2_000,
        help = "Cooldown after a session clear before the fresh pairing attempt."
    )]
    pub session_clear_cooldown_ms: u64,

    #[arg(
        long,
        default_value_t = 3_000,
        help = "Delay before retrying a failed connection attempt."
    )]
    pub startup_retry_delay_ms: u64,

    #[arg(
        long,
        default_value_t = 5_000,
        help = "Grace period for in-flight sends on shutdown."
    )]
    pub shutdown_grace_ms: u64,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, CliWorkMode};

    #[test]
    fn defaults_parse() {
        let cli = Cli::try_parse_from(["rho"]).expect("defaults");
        assert_eq!(cli.handler_prefix, "[!/.]");
        assert_eq!(cli.work_mode, CliWorkMode::Public);
        assert_eq!(cli.backoff_ms, vec![3_000, 5_000, 10_000, 20_000, 30_000]);
        assert_eq!(cli.max_reconnect_attempts, 5);
        assert!(!cli.auto_read);
    }

    #[test]
    fn backoff_schedule_accepts_custom_values() {
        let cli = Cli::try_parse_from(["rho", "--backoff-ms", "100,200"]).expect("custom");
        assert_eq!(cli.backoff_ms, vec![100, 200]);
    }
}
