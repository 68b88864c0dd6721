//! OpenAI-compatible backend for question generation and answer grading.

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    config::AiSettings,
    quiz::{
        models::{Difficulty, Question, QuestionOrigin},
        source::{QuestionSource, SourceError, SourceResult},
    },
};

const QUESTION_PROMPT: &str = "You are a quiz master. Create one short {difficulty_label} quiz \
question about \"{category}\".\n\
- One sentence (max 25 words), answerable in a few words.\n\
- Respond with strict JSON only: {\"question\": \"...\", \"answer\": \"...\"}";

const EVAL_PROMPT: &str = "You are a quiz judge.\n\
The question difficulty: {difficulty_label}\n\
Q: \"{question}\"\n\
Reference answer: \"{reference}\"\n\
Player answer: \"{answer}\"\n\n\
Score the player answer from 0 to 10 (10 = fully correct).\n\
Ignore grammar; judge meaning against the reference.\n\
Respond with: score: <number>/10";

/// Question source backed by an OpenAI-compatible chat completion endpoint.
#[derive(Clone)]
pub struct OpenAiSource {
    client: Client,
    settings: AiSettings,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct GeneratedQuestion {
    question: String,
    answer: String,
}

impl OpenAiSource {
    /// Build the source from configured settings.
    pub fn new(settings: AiSettings) -> SourceResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|err| SourceError::Unavailable(err.to_string()))?;
        Ok(Self { client, settings })
    }

    async fn chat(&self, prompt: String) -> SourceResult<String> {
        let url = format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.settings.api_key)
            .json(&json!({
                "model": self.settings.model,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await
            .map_err(|err| SourceError::Unavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "inference endpoint returned {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| SourceError::Malformed(err.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| SourceError::Malformed("response carried no choices".into()))
    }
}

impl QuestionSource for OpenAiSource {
    fn next_question(
        &self,
        category: String,
        difficulty: Difficulty,
    ) -> BoxFuture<'static, SourceResult<Question>> {
        let source = self.clone();
        Box::pin(async move {
            let prompt = QUESTION_PROMPT
                .replace("{difficulty_label}", difficulty.label())
                .replace("{category}", &category);

            let content = source.chat(prompt).await?;
            let generated = parse_generated(&content)?;
            debug!(category = %category, "generated question from AI source");

            Ok(Question {
                text: generated.question,
                options: Vec::new(),
                correct_answer: generated.answer,
                difficulty,
                origin: QuestionOrigin::Generated,
            })
        })
    }

    fn grade_answer(
        &self,
        question: Question,
        answer: String,
    ) -> BoxFuture<'static, SourceResult<u8>> {
        let source = self.clone();
        Box::pin(async move {
            let prompt = EVAL_PROMPT
                .replace("{difficulty_label}", question.difficulty.label())
                .replace("{question}", &question.text)
                .replace("{reference}", &question.correct_answer)
                .replace("{answer}", &answer);

            let content = source.chat(prompt).await?;
            parse_grade(&content).ok_or_else(|| {
                SourceError::Malformed(format!("no grade found in response `{content}`"))
            })
        })
    }
}

/// Extract the generated question JSON, tolerating surrounding prose or
/// markdown fences the model sometimes adds.
fn parse_generated(content: &str) -> SourceResult<GeneratedQuestion> {
    let trimmed = content.trim();
    if let Ok(parsed) = serde_json::from_str::<GeneratedQuestion>(trimmed) {
        return Ok(parsed);
    }

    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    if let (Some(start), Some(end)) = (start, end)
        && start < end
        && let Ok(parsed) = serde_json::from_str::<GeneratedQuestion>(&trimmed[start..=end])
    {
        return Ok(parsed);
    }

    Err(SourceError::Malformed(format!(
        "no question JSON in response `{content}`"
    )))
}

/// Extract the first 0-10 integer from a grading response.
fn parse_grade(content: &str) -> Option<u8> {
    content
        .split(|c: char| !c.is_ascii_digit())
        .filter(|chunk| !chunk.is_empty())
        .filter_map(|chunk| chunk.parse::<u8>().ok())
        .find(|grade| *grade <= 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_generated_accepts_plain_json() {
        let parsed =
            parse_generated(r#"{"question": "What is CI?", "answer": "Continuous Integration"}"#)
                .unwrap();
        assert_eq!(parsed.question, "What is CI?");
        assert_eq!(parsed.answer, "Continuous Integration");
    }

    #[test]
    fn parse_generated_strips_markdown_fences() {
        let content = "```json\n{\"question\": \"Q\", \"answer\": \"A\"}\n```";
        let parsed = parse_generated(content).unwrap();
        assert_eq!(parsed.answer, "A");
    }

    #[test]
    fn parse_generated_rejects_prose() {
        assert!(parse_generated("Sorry, I can't help with that.").is_err());
    }

    #[test]
    fn parse_grade_reads_score_formats() {
        assert_eq!(parse_grade("score: 7/10"), Some(7));
        assert_eq!(parse_grade("Your score: 10/10\nfeedback: great"), Some(10));
        assert_eq!(parse_grade("0"), Some(0));
        assert_eq!(parse_grade("no digits here"), None);
    }

    #[test]
    fn parse_grade_skips_out_of_range_numbers() {
        // "15" is not a valid grade; the trailing 10 of "/10" would be, but
        // a leading valid number wins when present.
        assert_eq!(parse_grade("score: 15/10"), Some(10));
        assert_eq!(parse_grade("graded 3 out of 10"), Some(3));
    }
}
