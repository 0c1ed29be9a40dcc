use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use lke_stream::{DEFAULT_SSE_URL, LkeClientConfig};

use crate::bridge::BridgeError;
use crate::crypto::MsgCrypt;
use crate::wecom::{DEFAULT_API_BASE, WecomConfig};

/// Loads `.env` from the crate directory and the working directory.
pub fn init_env() {
    let _ = dotenvy::from_path(Path::new(
        format!("{}/.env", env!("CARGO_MANIFEST_DIR")).as_str(),
    ));
    dotenvy::dotenv().ok();
}

#[derive(Debug, Parser)]
#[command(name = "wecom-bridge", version, about = "WeCom to LKE streaming bridge")]
pub struct Cli {
    /// Write JSON logs to `<dir>/app.log` instead of stdout.
    #[arg(long, env = "BRIDGE_LOG_DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the WeCom callback endpoint.
    Serve(ServeArgs),
    /// Send one question to LKE and deliver the answer.
    Ask(AskArgs),
    /// Decode a captured event-stream dump and print its chunks.
    Replay(ReplayArgs),
}

#[derive(Debug, Args)]
pub struct AskArgs {
    /// WeCom user id that receives the answer.
    #[arg(long)]
    pub user: String,

    /// WeCom application agent id the answer is sent from.
    #[arg(long)]
    pub agent_id: i64,

    /// Print chunks to stdout instead of sending them.
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub lke: LkeArgs,

    #[command(flatten)]
    pub wecom: WecomArgs,

    /// Question text.
    pub text: String,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address the callback endpoint listens on.
    #[arg(long, env = "BRIDGE_BIND", default_value = "0.0.0.0:80")]
    pub bind: SocketAddr,

    /// Callback token configured in the WeCom console.
    #[arg(long, env = "WX_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Callback `EncodingAESKey` configured in the WeCom console.
    #[arg(long, env = "WX_ENCODING_AES_KEY", hide_env_values = true)]
    pub encoding_aes_key: String,

    #[command(flatten)]
    pub lke: LkeArgs,

    #[command(flatten)]
    pub wecom: WecomArgs,
}

impl ServeArgs {
    /// Builds the callback codec; payloads are addressed to the corp id.
    pub fn to_crypt(&self) -> Result<MsgCrypt, BridgeError> {
        let corp_id = non_empty(self.wecom.corp_id.as_deref())
            .ok_or_else(|| BridgeError::Config("missing WX_CORP_ID".into()))?;
        Ok(MsgCrypt::new(
            self.token.trim(),
            &self.encoding_aes_key,
            corp_id,
        )?)
    }
}

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// File holding a raw `text/event-stream` body.
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct LkeArgs {
    #[arg(long, env = "TENCENT_CLOUD_LKE_APP_KEY", hide_env_values = true)]
    pub app_key: String,

    #[arg(long, env = "LKE_SSE_URL", default_value = DEFAULT_SSE_URL)]
    pub sse_url: String,

    /// Optional cap on a whole answer in seconds; unset streams without limit.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl LkeArgs {
    pub fn to_config(&self) -> LkeClientConfig {
        let config =
            LkeClientConfig::new(self.app_key.clone()).endpoint(self.sse_url.clone());
        match self.timeout_secs {
            Some(secs) => config.timeout(Duration::from_secs(secs)),
            None => config,
        }
    }
}

#[derive(Debug, Args)]
pub struct WecomArgs {
    #[arg(long, env = "WX_CORP_ID")]
    pub corp_id: Option<String>,

    #[arg(long, env = "WX_APP_SECRET", hide_env_values = true)]
    pub app_secret: Option<String>,

    #[arg(long, env = "WECOM_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,
}

impl WecomArgs {
    /// Builds the WeCom config; both credentials are required.
    pub fn to_config(&self) -> Result<WecomConfig, BridgeError> {
        let corp_id = non_empty(self.corp_id.as_deref())
            .ok_or_else(|| BridgeError::Config("missing WX_CORP_ID".into()))?;
        let app_secret = non_empty(self.app_secret.as_deref())
            .ok_or_else(|| BridgeError::Config("missing WX_APP_SECRET".into()))?;
        Ok(WecomConfig::new(corp_id, app_secret).api_base(self.api_base.clone()))
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ask_with_flags() {
        let cli = Cli::try_parse_from([
            "wecom-bridge",
            "ask",
            "--user",
            "zhangsan",
            "--agent-id",
            "1000002",
            "--app-key",
            "key",
            "--corp-id",
            "corp",
            "--app-secret",
            "secret",
            "--dry-run",
            "你好",
        ])
        .expect("parse");
        let Command::Ask(args) = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(args.user, "zhangsan");
        assert_eq!(args.agent_id, 1000002);
        assert!(args.dry_run);
        assert_eq!(args.text, "你好");
        let lke = args.lke.to_config();
        assert_eq!(lke.bot_app_key, "key");
        assert_eq!(lke.timeout, None);
        let wecom = args.wecom.to_config().expect("wecom config");
        assert_eq!(wecom.corp_id, "corp");
    }

    #[test]
    fn missing_wecom_credentials_is_config_error() {
        let args = WecomArgs {
            corp_id: Some("corp".into()),
            app_secret: Some("  ".into()),
            api_base: DEFAULT_API_BASE.into(),
        };
        assert!(matches!(
            args.to_config(),
            Err(BridgeError::Config(msg)) if msg.contains("WX_APP_SECRET")
        ));
    }

    #[test]
    fn parses_replay() {
        let cli = Cli::try_parse_from(["wecom-bridge", "replay", "dump.sse", "--log-dir", "logs"])
            .expect("parse");
        assert_eq!(cli.log_dir.as_deref(), Some(Path::new("logs")));
        assert!(matches!(cli.command, Command::Replay(ReplayArgs { ref file }) if file == Path::new("dump.sse")));
    }

    #[test]
    fn ask_requires_agent_id() {
        let err = Cli::try_parse_from([
            "wecom-bridge",
            "ask",
            "--user",
            "u",
            "--app-key",
            "key",
            "hi",
        ])
        .expect_err("agent id is required");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_serve_and_builds_crypt() {
        let cli = Cli::try_parse_from([
            "wecom-bridge",
            "serve",
            "--bind",
            "127.0.0.1:8080",
            "--token",
            "QDG6eK",
            "--encoding-aes-key",
            "jWmYm7qr5nMoAUwZRjGtBxmz3KA1tkAj3ykkR6q2B2C",
            "--app-key",
            "key",
            "--corp-id",
            "ww1436e0e65a779aee",
            "--app-secret",
            "secret",
            "--timeout-secs",
            "900",
        ])
        .expect("parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.bind, "127.0.0.1:8080".parse().expect("addr"));
        assert_eq!(args.lke.to_config().timeout, Some(Duration::from_secs(900)));
        assert!(args.to_crypt().is_ok());
    }

    #[test]
    fn serve_with_bad_aes_key_is_crypto_error() {
        let args = ServeArgs {
            bind: "127.0.0.1:0".parse().expect("addr"),
            token: "t".into(),
            encoding_aes_key: "too-short".into(),
            lke: LkeArgs {
                app_key: "key".into(),
                sse_url: DEFAULT_SSE_URL.into(),
                timeout_secs: None,
            },
            wecom: WecomArgs {
                corp_id: Some("corp".into()),
                app_secret: Some("secret".into()),
                api_base: DEFAULT_API_BASE.into(),
            },
        };
        assert!(matches!(args.to_crypt(), Err(BridgeError::Crypto(_))));
    }
}
