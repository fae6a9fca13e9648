//! Command execution.

use crate::{Commands, MessageArgs};
use colored::Colorize;
use kobold_client::Client;
use kobold_protocol::{Codec, Format, Message, StreamParser};

type CommandResult = Result<String, Box<dyn std::error::Error>>;

/// Executes a command against a connected client and returns the formatted output.
pub async fn execute(client: &mut Client, cmd: Commands) -> CommandResult {
    match cmd {
        Commands::Pub {
            topic,
            count,
            content,
        } => {
            let content = content.unwrap_or_default().into_bytes();
            for _ in 0..count {
                client.publish(topic.as_str(), content.clone()).await?;
            }
            Ok(format!(
                "{} {} message(s) on {}",
                "Published".green(),
                count,
                topic.cyan()
            ))
        }

        Commands::Send { message } => {
            let op = message.op;
            let topic = message.topic.clone();
            let id = client
                .send(
                    op,
                    message.topic,
                    message.content.map(String::into_bytes),
                    message.tx_id,
                )
                .await?;
            Ok(format!(
                "{} {} on {} (id: {})",
                "Sent".green(),
                op,
                topic.cyan(),
                id
            ))
        }

        Commands::Encode { .. } | Commands::Decode { .. } => {
            Err("offline command routed to a connection".into())
        }
    }
}

/// Executes a command that needs no connection.
pub fn execute_offline(format: Format, cmd: Commands) -> CommandResult {
    let codec = Codec::new(format);
    match cmd {
        Commands::Encode { message } => encode(&codec, message),
        Commands::Decode { hex } => decode(&codec, &hex),
        _ => Err("command requires a connection".into()),
    }
}

fn build_message(args: MessageArgs) -> Message {
    let mut message = Message::new(args.id, args.op, args.topic);
    if let Some(content) = args.content {
        message = message.with_content(content.into_bytes());
    }
    if let Some(tx_id) = args.tx_id {
        message = message.with_transaction_id(tx_id);
    }
    message
}

fn encode(codec: &Codec, args: MessageArgs) -> CommandResult {
    let frame = codec.serialize(&build_message(args))?;
    Ok(hex::encode(&frame))
}

fn decode(codec: &Codec, input: &str) -> CommandResult {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(cleaned)?;

    let mut parser = StreamParser::new();
    let frames = parser.feed(&bytes)?;

    let mut lines = Vec::with_capacity(frames.len());
    for frame in &frames {
        let message = codec.deserialize(frame)?;
        lines.push(serde_json::to_string(&message)?);
    }
    if let Some(e) = parser.rejected() {
        lines.push(format!("{}: {}", "Error".red(), e));
    } else if parser.buffered() > 0 {
        lines.push(format!(
            "{}: {} trailing byte(s) do not form a complete frame",
            "Warning".yellow(),
            parser.buffered()
        ));
    }
    Ok(lines.join("\n"))
}
