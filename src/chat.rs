//! The interactive question loop.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::config::LlmConfig;
use crate::core::errors::RagError;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::rag::{PromptBuilder, ReviewIndex};

const ASK_PROMPT: &str = "\nAsk your question (q to quit): ";

pub struct ChatSession {
    index: ReviewIndex,
    llm: Arc<dyn LlmProvider>,
    prompt: PromptBuilder,
    top_k: usize,
    llm_config: LlmConfig,
}

impl ChatSession {
    pub fn new(
        index: ReviewIndex,
        llm: Arc<dyn LlmProvider>,
        prompt: PromptBuilder,
        top_k: usize,
        llm_config: LlmConfig,
    ) -> Self {
        Self {
            index,
            llm,
            prompt,
            top_k,
            llm_config,
        }
    }

    /// Reads questions from `input` until `q`, `quit` or end of input,
    /// streaming each answer to `output` as it is generated.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> Result<(), RagError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();

        loop {
            output.write_all(ASK_PROMPT.as_bytes()).await?;
            output.flush().await?;

            let Some(line) = lines.next_line().await? else {
                output.write_all(b"\n").await?;
                break;
            };

            let question = line.trim();
            if is_quit(question) {
                output.write_all(b"Exiting...\n").await?;
                break;
            }
            if question.is_empty() {
                output.write_all(b"Please enter a valid question.\n").await?;
                continue;
            }

            self.answer(question, &mut output).await?;
        }

        output.flush().await?;
        Ok(())
    }

    /// Retrieves supporting reviews for `question` and streams one answer.
    pub async fn answer<W>(&self, question: &str, output: &mut W) -> Result<(), RagError>
    where
        W: AsyncWrite + Unpin,
    {
        let reviews = self.index.retrieve(question, self.top_k).await?;
        let prompt = self.prompt.build(&reviews, question);
        let request = ChatRequest::new(vec![ChatMessage::user(prompt)]).with_config(&self.llm_config);

        let mut tokens = self.llm.stream_chat(request).await?;
        output.write_all(b"\nAnswer:\n").await?;
        while let Some(token) = tokens.recv().await {
            output.write_all(token?.as_bytes()).await?;
            output.flush().await?;
        }
        output.write_all(b"\n").await?;
        Ok(())
    }
}

fn is_quit(input: &str) -> bool {
    input.eq_ignore_ascii_case("q") || input.eq_ignore_ascii_case("quit")
}
