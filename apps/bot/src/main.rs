use std::sync::Arc;

use analyst::OpenAiAnalyst;
use anyhow::Result;
use bot::{
    Data,
    command::stock::stock_command,
    config::Config,
    handler::{Inbound, QuoteHandler},
    health,
    reply::ChannelReply,
};
use poise::{Framework, FrameworkOptions};
use serenity::all::{ClientBuilder, FullEvent, GatewayIntents};
use stock::{CharmingRenderer, PriceClient};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const CREDENTIALS: [&str; 2] = ["DISCORD_TOKEN", "OPENAI_API_KEY"];

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    for name in CREDENTIALS {
        let present = std::env::var(name).is_ok_and(|v| !v.trim().is_empty());
        info!(name, present, "credential check");
    }

    let config = Config::from_env().inspect_err(|e| {
        error!(error = %e, "set DISCORD_TOKEN and OPENAI_API_KEY before starting");
    })?;
    info!(
        version = %config.version,
        prefix = %config.trigger_prefix,
        lookback = %config.lookback.caption(),
        "configuration loaded"
    );

    let market = Arc::new(PriceClient::new(config.yahoo_api_base.clone())?);
    let analyst = Arc::new(OpenAiAnalyst::new(config.openai_config())?);
    let handler = Arc::new(QuoteHandler::new(
        market,
        Arc::new(CharmingRenderer::default()),
        analyst,
        config.handler_settings(),
    ));

    health::spawn(config.port);

    let intents = GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT;
    let commands = vec![stock_command()];

    let framework = Framework::builder()
        .options(FrameworkOptions {
            event_handler: |serenity_ctx, event, framework_ctx, data: &Data| {
                Box::pin(async move {
                    if let FullEvent::Message { new_message } = event {
                        let inbound = Inbound {
                            from_self: new_message.author.id == framework_ctx.bot_id,
                            content: &new_message.content,
                        };
                        let reply =
                            ChannelReply::new(serenity_ctx.http.clone(), new_message.channel_id);
                        data.handler.handle(inbound, &reply).await;
                    }
                    Ok(())
                })
            },
            commands,
            ..Default::default()
        })
        .setup({
            let handler = Arc::clone(&handler);

            move |ctx, ready, framework| {
                let handler = Arc::clone(&handler);

                Box::pin(async move {
                    info!(
                        "{} [{}] connected successfully!",
                        ready.user.name, ready.user.id
                    );

                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                    Ok(Data { handler })
                })
            }
        })
        .build();

    let mut client = ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await?;

    let mut client_task = tokio::spawn(async move { client.start().await });

    tokio::select! {
        res = &mut client_task => match res {
            Ok(Ok(())) => info!("client stopped"),
            Ok(Err(why)) => {
                error!("Client error: {why:?}");
                return Err(why.into());
            }
            Err(e) => return Err(e.into()),
        },
        res = shutdown_signal() => {
            res?;
            info!("shutdown signal received");
        }
    }

    info!("Shutdown complete.");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::{
        select,
        signal::unix::{SignalKind, signal},
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    select! {
        _ = sigterm.recv() => {},
        _ = sigint.recv()  => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
