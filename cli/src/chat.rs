//! `chat` サブコマンド：デプロイ済みエージェントとの対話ループ
use agent::DeployedAgent;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

const PROMPT: &str = "User > ";

/// 1行の入力の解釈結果
#[derive(Debug, PartialEq, Eq)]
enum ChatInput<'a> {
    Empty,
    Exit,
    Message(&'a str),
}

fn parse_input(line: &str) -> ChatInput<'_> {
    let input = line.trim();
    if input.is_empty() {
        ChatInput::Empty
    } else if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
        ChatInput::Exit
    } else {
        ChatInput::Message(input)
    }
}

/// 1つのセッションで、入力ごとにストリーミング問い合わせを行う
///
/// 問い合わせの失敗はログに出してループを続ける。
pub async fn run_chat(deployed: &DeployedAgent, user_id: &str) -> anyhow::Result<()> {
    let session = deployed.create_session(user_id).await?;
    tracing::info!(session_id = %session.id, "chat session created");

    let mut editor = DefaultEditor::new()?;
    println!("Session {} ready. Type 'exit' or 'quit' to stop.", session.id);

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(err) => {
                tracing::error!("Failed to read input: {}", err);
                break;
            }
        };

        let message = match parse_input(&line) {
            ChatInput::Empty => continue,
            ChatInput::Exit => break,
            ChatInput::Message(message) => message,
        };
        let _ = editor.add_history_entry(message);

        let events = match deployed
            .stream_query(user_id, Some(session.id.as_str()), message)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("Agent Engine call failed: {}", e);
                continue;
            }
        };

        match crate::print_events(events).await {
            Ok(count) => tracing::debug!(count, "response finished"),
            Err(e) => tracing::error!("Stream interrupted: {}", e),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("   "), ChatInput::Empty);
        assert_eq!(parse_input("QUIT"), ChatInput::Exit);
        assert_eq!(parse_input(" exit\n"), ChatInput::Exit);
        assert_eq!(
            parse_input("  ¿Qué pasó hoy?  "),
            ChatInput::Message("¿Qué pasó hoy?")
        );
        assert_eq!(parse_input("exit now"), ChatInput::Message("exit now"));
    }
}
