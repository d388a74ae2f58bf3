//! # CLI Interface
//!
//! Command-line structure for `beatit-nfc`, defined with `clap` derive.
//! Every subcommand works against a tag file standing in for the NFC tag
//! between two phones.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use beatit_nfc::RecordFormat;

use crate::logging::LogFormat;

/// BeatIt NFC handoff tool.
///
/// Shares and receives songs over the offline NFC handoff protocol, using a
/// binary NDEF file as the tag.
#[derive(Parser, Debug)]
#[command(
    name = "beatit-nfc",
    about = "BeatIt NFC song handoff tool",
    version,
    propagate_version = true
)]
pub struct BeatitNfcCli {
    /// Handoff configuration file (TOML). Missing keys take their defaults.
    #[arg(long, short = 'c', global = true, env = "BEATIT_NFC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a fresh handoff token for a song onto the tag.
    Share(ShareArgs),
    /// Read the tag once, validate it and play the song.
    Receive(ReceiveArgs),
    /// Watch the tag and hand every new token to the player until stopped.
    Listen(ListenArgs),
    /// Decode the tag without validating or consuming it.
    Inspect(InspectArgs),
    /// Forget every consumed session.
    ClearSessions(DataDirArgs),
    /// Print version information and exit.
    Version,
}

/// Record format override for `share`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Uri,
    Mime,
}

impl From<FormatArg> for RecordFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Uri => RecordFormat::Uri,
            FormatArg::Mime => RecordFormat::Mime,
        }
    }
}

#[derive(Args, Debug)]
pub struct DataDirArgs {
    /// Directory holding the replay store and settings.
    #[arg(long, short = 'd', env = "BEATIT_NFC_DATA_DIR", default_value = ".beatit-nfc")]
    pub data_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct ShareArgs {
    /// Id of the song to share.
    #[arg(long)]
    pub song_id: String,

    /// Tag file to write.
    #[arg(long, short = 't')]
    pub tag: PathBuf,

    /// Payload record format. Defaults to the configured one.
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Write the token without a signature.
    #[arg(long)]
    pub unsigned: bool,
}

#[derive(Args, Debug)]
pub struct ReceiveArgs {
    /// Tag file to read.
    #[arg(long, short = 't')]
    pub tag: PathBuf,

    #[command(flatten)]
    pub data: DataDirArgs,

    /// JSON array of `{ "id", "title" }` songs available locally.
    ///
    /// Without a catalog every song id is treated as available.
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Tag file to watch.
    #[arg(long, short = 't')]
    pub tag: PathBuf,

    #[command(flatten)]
    pub data: DataDirArgs,

    /// JSON array of `{ "id", "title" }` songs available locally.
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Play received songs without asking. The choice is persisted.
    #[arg(long)]
    pub auto_accept: bool,

    /// How often the tag file is checked, in milliseconds.
    #[arg(long, default_value_t = 250)]
    pub poll_ms: u64,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Tag file to decode.
    #[arg(long, short = 't')]
    pub tag: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        BeatitNfcCli::command().debug_assert();
    }

    #[test]
    fn share_flags_parse() {
        let cli = BeatitNfcCli::try_parse_from([
            "beatit-nfc",
            "--log-format",
            "json",
            "share",
            "--song-id",
            "abc123",
            "--tag",
            "tag.ndef",
            "--format",
            "mime",
            "--unsigned",
        ])
        .unwrap();

        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Share(args) => {
                assert_eq!(args.song_id, "abc123");
                assert_eq!(args.format, Some(FormatArg::Mime));
                assert!(args.unsigned);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn clear_sessions_has_default_data_dir() {
        let cli = BeatitNfcCli::try_parse_from(["beatit-nfc", "clear-sessions"]).unwrap();
        match cli.command {
            Commands::ClearSessions(args) => {
                assert!(!args.data_dir.as_os_str().is_empty());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
