use std::sync::Arc;

use clap::Parser as _;
use lke_stream::LkeClient;
use wecom_bridge::config::{AskArgs, Cli, Command, ServeArgs, init_env};
use wecom_bridge::{
    Bridge, CallbackState, ChunkSink, InboundMessage, StdoutSink, WecomClient, WecomSink,
    init_observability, replay::replay_file, server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_env();
    let cli = Cli::parse();
    init_observability(cli.log_dir.as_deref());

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Ask(args) => ask(args).await,
        Command::Replay(args) => {
            for chunk in replay_file(&args.file).await? {
                println!("{chunk}\n---");
            }
            Ok(())
        }
    }
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let crypt = args.to_crypt()?;
    let lke = LkeClient::new(args.lke.to_config())?;
    let wecom = WecomClient::new(args.wecom.to_config()?)?;
    let sink: Arc<dyn ChunkSink> = Arc::new(WecomSink::new(Arc::new(wecom)));
    let bridge = Arc::new(Bridge::new(lke, sink));
    server::serve(args.bind, CallbackState::new(crypt, bridge)).await
}

async fn ask(args: AskArgs) -> anyhow::Result<()> {
    let lke = LkeClient::new(args.lke.to_config())?;
    let sink: Arc<dyn ChunkSink> = if args.dry_run {
        Arc::new(StdoutSink)
    } else {
        let client = WecomClient::new(args.wecom.to_config()?)?;
        Arc::new(WecomSink::new(Arc::new(client)))
    };
    let bridge = Bridge::new(lke, sink);
    let delivered = bridge
        .handle_inbound(&InboundMessage::text(args.user, args.agent_id, args.text))
        .await?;
    tracing::info!(delivered, "ask finished");
    Ok(())
}
