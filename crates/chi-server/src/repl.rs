//! Interactive Mode
//!
//! One prompt per line on stdin, one answer per turn on stdout. Turns go
//! through the same controller as the HTTP API.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use chi_core::JobController;

const BANNER: &str = "chi-agent interactive mode. Type 'quit' to exit.";
const PROMPT: &str = "\nchi> ";

/// Read prompts until `quit`, `exit` or end of input
pub async fn run<R, W>(controller: &JobController, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output.write_all(BANNER.as_bytes()).await?;
    output.write_all(b"\n").await?;

    let mut lines = input.lines();
    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            output.write_all(b"\nBye.\n").await?;
            break;
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if prompt.eq_ignore_ascii_case("quit") || prompt.eq_ignore_ascii_case("exit") {
            break;
        }

        let response = controller.ask(prompt).await;
        output.write_all(format!("\n{}\n", response).as_bytes()).await?;
    }

    output.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    use chi_core::{
        Agent, AgentConfig, GenerationOptions, HistoryConfig, HistoryStore, LlmProvider, Message, Role,
        SessionStore, ToolRegistry, ToolSpec,
    };

    /// Echoes the last user message back in upper case
    #[derive(Default)]
    struct ShoutingProvider {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl LlmProvider for ShoutingProvider {
        async fn health_check(&self) -> chi_core::Result<bool> {
            Ok(true)
        }

        async fn chat(
            &self,
            messages: &[Message],
            _tools: &[ToolSpec],
            _options: &GenerationOptions,
        ) -> chi_core::Result<Message> {
            *self.calls.lock().unwrap() += 1;
            let last = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.to_uppercase())
                .unwrap_or_default();
            Ok(Message::assistant(last))
        }
    }

    fn controller() -> (JobController, Arc<ShoutingProvider>, Arc<SessionStore>) {
        let provider = Arc::new(ShoutingProvider::default());
        let store = Arc::new(SessionStore::in_memory(HistoryConfig::default()));
        let agent = Agent::new(provider.clone(), Arc::new(ToolRegistry::new()), AgentConfig::default());
        (JobController::new(agent, store.clone()), provider, store)
    }

    #[tokio::test]
    async fn test_answers_until_quit() {
        let (controller, provider, store) = controller();
        let mut output = Vec::new();

        run(&controller, &b"hello\n\n  status  \nQUIT\nignored\n"[..], &mut output)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with(BANNER));
        assert!(text.contains("\nHELLO\n"));
        assert!(text.contains("\nSTATUS\n"));
        assert!(!text.contains("IGNORED"));
        assert_eq!(*provider.calls.lock().unwrap(), 2);
        assert_eq!(store.list_conversations(10).unwrap()[0].message_count, 4);
    }

    #[tokio::test]
    async fn test_end_of_input_says_bye() {
        let (controller, provider, _) = controller();
        let mut output = Vec::new();

        run(&controller, &b""[..], &mut output).await.unwrap();

        assert!(String::from_utf8(output).unwrap().ends_with("\nBye.\n"));
        assert_eq!(*provider.calls.lock().unwrap(), 0);
    }
}
