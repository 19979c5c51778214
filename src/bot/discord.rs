use crate::config::Config;
use crate::dispatch::{Dispatcher, NoticeHandle, Relay, RelayTarget};
use crate::links::Link;
use crate::media::{MediaFile, MediaKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};
use twilight_cache_inmemory::InMemoryCache;
use twilight_gateway::{Event, Intents, Shard, ShardId, StreamExt};
use twilight_http::Client as HttpClient;
use twilight_model::{
    application::{
        command::CommandType,
        interaction::{
            application_command::CommandData, Interaction, InteractionData, InteractionType,
        },
    },
    channel::message::MessageFlags,
    gateway::payload::incoming::MessageCreate,
    http::{
        attachment::Attachment,
        interaction::{InteractionResponse, InteractionResponseType},
    },
    id::{
        marker::{ChannelMarker, MessageMarker},
        Id,
    },
};
use twilight_util::builder::command::{CommandBuilder, StringBuilder};

/// Discord cuts off uploads above 25MB on most servers.
const MAX_UPLOAD_BYTES: u64 = 25_000_000;

/// Discord side of the relay seam: progress notices, attachments, failure
/// messages.
pub struct DiscordRelay {
    http: Arc<HttpClient>,
}

#[async_trait]
impl Relay for DiscordRelay {
    async fn notify_started(
        &self,
        target: &RelayTarget,
        _link: &Link,
    ) -> Result<Option<NoticeHandle>> {
        let channel_id: Id<ChannelMarker> = Id::new(target.channel_id);

        let mut request = self.http.create_message(channel_id).content("⏳ Downloading...");
        if let Some(reply_to) = target.reply_to {
            request = request.reply(Id::new(reply_to));
        }

        let message = request.await?.model().await?;
        Ok(Some(message.id.get()))
    }

    async fn clear_notice(&self, target: &RelayTarget, notice: NoticeHandle) -> Result<()> {
        let channel_id: Id<ChannelMarker> = Id::new(target.channel_id);
        let message_id: Id<MessageMarker> = Id::new(notice);
        self.http.delete_message(channel_id, message_id).await?;
        Ok(())
    }

    async fn send_media(&self, target: &RelayTarget, file: &MediaFile, link: &Link) -> Result<()> {
        let channel_id: Id<ChannelMarker> = Id::new(target.channel_id);

        let file_size = tokio::fs::metadata(&file.path).await?.len();
        if file_size > MAX_UPLOAD_BYTES {
            self.http
                .create_message(channel_id)
                .content(&format!(
                    "❌ File too large ({:.1}MB). Discord limit is 25MB.",
                    file_size as f64 / 1_000_000.0
                ))
                .await?;
            return Ok(());
        }

        let data = tokio::fs::read(&file.path).await?;
        let attachments = [Attachment::from_bytes(
            file.file_name(),
            data,
            SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs(),
        )];

        let icon = match file.kind {
            MediaKind::Video => "🎬",
            MediaKind::Image => "🖼️",
        };
        let content = format!("{} {}", icon, link.url);

        let mut request = self
            .http
            .create_message(channel_id)
            .content(&content)
            .attachments(&attachments);
        if let Some(reply_to) = target.reply_to {
            request = request.reply(Id::new(reply_to));
        }
        request.await?;

        Ok(())
    }

    async fn send_error(&self, target: &RelayTarget, link: &Link) -> Result<()> {
        let channel_id: Id<ChannelMarker> = Id::new(target.channel_id);

        let content = format!("⚠️ Couldn't download {}", link.url);
        let mut request = self.http.create_message(channel_id).content(&content);
        if let Some(reply_to) = target.reply_to {
            request = request.reply(Id::new(reply_to));
        }
        request.await?;

        Ok(())
    }
}

pub struct DiscordBot {
    http: Arc<HttpClient>,
    cache: InMemoryCache,
    shard: Shard,
    dispatcher: Dispatcher,
    relay: Arc<DiscordRelay>,
    config: Config,
    application_id: Id<twilight_model::id::marker::ApplicationMarker>,
}

impl DiscordBot {
    pub async fn new(token: String, config: Config) -> Result<Self> {
        let http = Arc::new(HttpClient::new(token.clone()));
        let cache = InMemoryCache::new();

        let intents = Intents::GUILD_MESSAGES | Intents::MESSAGE_CONTENT;
        let shard = Shard::new(ShardId::ONE, token, intents);

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build HTTP client")?;
        let dispatcher = Dispatcher::new(&config, client);

        if let Err(e) = dispatcher.engine().check_tools().await {
            warn!("Downloader check failed: {}", e);
        }

        let application_id = {
            let response = http.current_user_application().await?;
            response.model().await?.id
        };

        let relay = Arc::new(DiscordRelay {
            http: Arc::clone(&http),
        });

        let bot = Self {
            http,
            cache,
            shard,
            dispatcher,
            relay,
            config,
            application_id,
        };

        bot.register_commands().await?;

        Ok(bot)
    }

    async fn register_commands(&self) -> Result<()> {
        info!("Registering Discord slash commands...");

        let snap_command = CommandBuilder::new(
            "snap".to_string(),
            "Download media from a supported platform URL".to_string(),
            CommandType::ChatInput,
        )
        .option(StringBuilder::new("url", "Link to download").required(true))
        .build();

        self.http
            .interaction(self.application_id)
            .create_global_command()
            .chat_input(&snap_command.name, &snap_command.description)
            .command_options(&snap_command.options)
            .await?;

        info!("Successfully registered /snap slash command");
        Ok(())
    }

    pub async fn run(mut self) -> Result<()> {
        info!("Discord bot starting...");

        loop {
            let event = match self
                .shard
                .next_event(twilight_gateway::EventTypeFlags::all())
                .await
            {
                Some(Ok(event)) => event,
                Some(Err(source)) => {
                    error!(?source, "Error receiving event");
                    continue;
                }
                None => {
                    info!("Shard stream ended");
                    return Ok(());
                }
            };

            self.cache.update(&event);

            match event {
                Event::MessageCreate(msg) => {
                    self.handle_message(&msg).await;
                }
                Event::InteractionCreate(interaction) => {
                    if let Err(e) = self.handle_interaction(&interaction).await {
                        error!("Failed to handle interaction: {}", e);
                    }
                }
                Event::Ready(_) => {
                    info!("Discord bot is ready!");
                }
                _ => {}
            }
        }
    }

    async fn handle_message(&self, msg: &MessageCreate) {
        if msg.author.bot {
            return;
        }

        if !self.config.is_allowed_channel(&msg.channel_id.to_string()) {
            return;
        }

        let links = self.dispatcher.collect_links(&msg.content).await;
        if links.is_empty() {
            return;
        }

        info!("Found {} supported link(s) in message", links.len());

        let target = RelayTarget {
            channel_id: msg.channel_id.get(),
            reply_to: Some(msg.id.get()),
        };
        self.dispatcher
            .dispatch(Arc::clone(&self.relay), target, links);
    }

    #[allow(clippy::single_match)]
    async fn handle_interaction(&self, interaction: &Interaction) -> Result<()> {
        match interaction.kind {
            InteractionType::ApplicationCommand => {
                if let Some(InteractionData::ApplicationCommand(data)) = &interaction.data {
                    match data.name.as_str() {
                        "snap" => {
                            self.handle_snap_command(interaction, data).await?;
                        }
                        _ => {
                            info!("Unknown command: {}", data.name);
                        }
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    async fn handle_snap_command(
        &self,
        interaction: &Interaction,
        data: &CommandData,
    ) -> Result<()> {
        let url = data.options.iter()
            .find(|opt| opt.name == "url")
            .and_then(|opt| match &opt.value {
                twilight_model::application::interaction::application_command::CommandOptionValue::String(s) => Some(s.as_str()),
                _ => None,
            })
            .unwrap_or("");

        if url.is_empty() {
            self.respond_to_interaction(interaction, "Please provide a valid URL.")
                .await?;
            return Ok(());
        }

        let links = self.dispatcher.collect_links(url).await;
        if links.is_empty() {
            self.respond_to_interaction(interaction, "This URL is not supported.")
                .await?;
            return Ok(());
        }

        self.respond_to_interaction(interaction, "Downloading media...")
            .await?;

        let channel_id = match interaction.channel.as_ref() {
            Some(channel) => channel.id,
            None => {
                error!("No channel information in interaction");
                return Ok(());
            }
        };

        let target = RelayTarget {
            channel_id: channel_id.get(),
            reply_to: None,
        };
        self.dispatcher
            .dispatch(Arc::clone(&self.relay), target, links);

        Ok(())
    }

    async fn respond_to_interaction(&self, interaction: &Interaction, content: &str) -> Result<()> {
        let response = InteractionResponse {
            kind: InteractionResponseType::ChannelMessageWithSource,
            data: Some(twilight_model::http::interaction::InteractionResponseData {
                allowed_mentions: None,
                attachments: None,
                choices: None,
                components: None,
                content: Some(content.to_string()),
                custom_id: None,
                embeds: None,
                flags: Some(MessageFlags::EPHEMERAL),
                poll: None,
                title: None,
                tts: None,
            }),
        };

        self.http
            .interaction(self.application_id)
            .create_response(interaction.id, &interaction.token, &response)
            .await?;

        Ok(())
    }
}

pub async fn run(config: Config) -> Result<()> {
    let token = config
        .discord_token
        .clone()
        .or_else(|| std::env::var("DISCORD_TOKEN").ok())
        .context("DISCORD_TOKEN is required (config file or environment)")?;

    std::fs::create_dir_all(&config.downloads_dir)
        .with_context(|| format!("failed to create {}", config.downloads_dir.display()))?;

    let bot = DiscordBot::new(token, config).await?;
    bot.run().await
}
