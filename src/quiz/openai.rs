use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use serde::Deserialize;
use std::time::Duration;

use super::{
    validate_question_set, QuestionSetRequest, QuestionSupplier, SupplierError, SupplierResult,
};
use crate::types::{Answer, Question};

const SYSTEM_PROMPT: &str = "You are a quiz generation engine. You ONLY output valid JSON.";

/// Question supplier backed by the OpenAI chat completions API.
pub struct OpenAiQuestionSupplier {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiQuestionSupplier {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        let client = Client::with_config(config);

        Self {
            client,
            model,
            timeout,
        }
    }
}

/// One generated question on the wire: four answer strings and a 1-based
/// index of the correct one.
#[derive(Debug, Deserialize)]
struct RawQuestion {
    question: String,
    answer1: String,
    answer2: String,
    answer3: String,
    answer4: String,
    c_answer: u8,
}

impl RawQuestion {
    fn into_question(self) -> SupplierResult<Question> {
        if !(1..=4).contains(&self.c_answer) {
            return Err(SupplierError::ParseError(format!(
                "c_answer {} out of range",
                self.c_answer
            )));
        }

        let answers = [self.answer1, self.answer2, self.answer3, self.answer4]
            .into_iter()
            .enumerate()
            .map(|(i, text)| Answer {
                id: ulid::Ulid::new().to_string(),
                text,
                is_correct: i + 1 == self.c_answer as usize,
            })
            .collect();

        Ok(Question {
            id: ulid::Ulid::new().to_string(),
            question: self.question,
            answers,
        })
    }
}

struct DifficultyProfile {
    label: &'static str,
    audience: &'static str,
    depth_rules: &'static str,
    distractor_rules: &'static str,
}

fn difficulty_profile(difficulty: u8) -> DifficultyProfile {
    match difficulty {
        2 => DifficultyProfile {
            label: "HARD",
            audience: "Assume the player is experienced and familiar with standard mechanics and meta knowledge.",
            depth_rules: "Focus on deeper mechanics, common edge cases, and well-known advanced concepts.",
            distractor_rules: "All incorrect answers should be plausible and close to the correct one.",
        },
        3 => DifficultyProfile {
            label: "EXPERT / NICHE",
            audience: "Assume the player is highly experienced and deeply knowledgeable.",
            depth_rules: "Include deep, niche, or obscure knowledge: rare mechanics, subtle exceptions, historical behaviors.",
            distractor_rules: "ALL incorrect answers must be extremely close to the correct one.",
        },
        _ => DifficultyProfile {
            label: "EASY",
            audience: "Assume the player is familiar with the topic at a casual or beginner level.",
            depth_rules: "Focus on commonly known, widely recognized concepts; avoid niche interactions.",
            distractor_rules: "At least one incorrect answer may be obviously wrong; the rest plausible but clearly distinguishable.",
        },
    }
}

fn build_user_prompt(request: &QuestionSetRequest) -> String {
    let profile = difficulty_profile(request.difficulty);

    let exclusions = if request.exclude_texts.is_empty() {
        String::new()
    } else {
        format!(
            "\n\nDo NOT repeat any of these questions:\n{}",
            request.exclude_texts.join("\n")
        )
    };

    format!(
        "Topic: {topic}\n\n\
         Task:\nGenerate exactly {count} quiz questions.\n\n\
         Difficulty:\n{label}\n\n\
         Audience:\n{audience}\n\n\
         Content depth rules:\n{depth}\n\n\
         Answer rules:\n{distractors}\n\n\
         Output format:\nReturn a JSON array with exactly {count} objects.\n\n\
         Each object MUST contain:\n\
         - question: string\n\
         - answer1: string\n\
         - answer2: string\n\
         - answer3: string\n\
         - answer4: string\n\
         - c_answer: number (1-4)\n\n\
         Hard constraints:\n\
         - Output ONLY the JSON array.\n\
         - No explanations or extra text.{exclusions}",
        topic = request.topic,
        count = request.count,
        label = profile.label,
        audience = profile.audience,
        depth = profile.depth_rules,
        distractors = profile.distractor_rules,
    )
}

fn parse_question_set(raw: &str, expected_count: u32) -> SupplierResult<Vec<Question>> {
    let parsed: Vec<RawQuestion> = serde_json::from_str(raw.trim())
        .map_err(|e| SupplierError::ParseError(format!("invalid JSON: {e}")))?;

    let questions = parsed
        .into_iter()
        .map(RawQuestion::into_question)
        .collect::<SupplierResult<Vec<_>>>()?;

    validate_question_set(&questions, expected_count)?;
    Ok(questions)
}

#[async_trait::async_trait]
impl QuestionSupplier for OpenAiQuestionSupplier {
    async fn question_set(&self, request: QuestionSetRequest) -> SupplierResult<Vec<Question>> {
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(0.1)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SYSTEM_PROMPT)
                    .build()
                    .map_err(|e| SupplierError::ApiError(e.to_string()))?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(build_user_prompt(&request))
                    .build()
                    .map_err(|e| SupplierError::ApiError(e.to_string()))?
                    .into(),
            ])
            .build()
            .map_err(|e| SupplierError::ApiError(e.to_string()))?;

        let response =
            tokio::time::timeout(self.timeout, self.client.chat().create(chat_request))
                .await
                .map_err(|_| SupplierError::Timeout(self.timeout))?
                .map_err(|e| {
                    let message = e.to_string();
                    if message.contains("429") {
                        SupplierError::RateLimit
                    } else {
                        SupplierError::ApiError(message)
                    }
                })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| SupplierError::ParseError("no content in response".to_string()))?;

        parse_question_set(&content, request.count)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_wire_format() {
        let raw = r#"[
            {"question": "Capital of France?",
             "answer1": "Paris", "answer2": "Lyon",
             "answer3": "Nice", "answer4": "Lille",
             "c_answer": 1},
            {"question": "Largest planet?",
             "answer1": "Mars", "answer2": "Jupiter",
             "answer3": "Venus", "answer4": "Saturn",
             "c_answer": 2}
        ]"#;

        let questions = parse_question_set(raw, 2).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].correct_answer().unwrap().text, "Paris");
        assert_eq!(questions[1].correct_answer().unwrap().text, "Jupiter");
        // Every answer gets a fresh unique id.
        let ids: std::collections::HashSet<_> = questions
            .iter()
            .flat_map(|q| q.answers.iter().map(|a| a.id.as_str()))
            .collect();
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn rejects_non_array_payloads() {
        let result = parse_question_set(r#"{"question": "not a list"}"#, 1);
        assert!(matches!(result, Err(SupplierError::ParseError(_))));
    }

    #[test]
    fn rejects_out_of_range_correct_index() {
        let raw = r#"[{"question": "Q", "answer1": "a", "answer2": "b",
                       "answer3": "c", "answer4": "d", "c_answer": 5}]"#;
        assert!(matches!(
            parse_question_set(raw, 1),
            Err(SupplierError::ParseError(_))
        ));
    }

    #[test]
    fn rejects_count_mismatch() {
        let raw = r#"[{"question": "Q", "answer1": "a", "answer2": "b",
                       "answer3": "c", "answer4": "d", "c_answer": 1}]"#;
        assert!(matches!(
            parse_question_set(raw, 3),
            Err(SupplierError::MalformedSet(_))
        ));
    }

    #[test]
    fn prompt_carries_topic_count_and_exclusions() {
        let prompt = build_user_prompt(&QuestionSetRequest {
            topic: "Rust".to_string(),
            difficulty: 3,
            count: 5,
            exclude_texts: vec!["What is a borrow checker?".to_string()],
        });

        assert!(prompt.contains("Topic: Rust"));
        assert!(prompt.contains("exactly 5 quiz questions"));
        assert!(prompt.contains("EXPERT / NICHE"));
        assert!(prompt.contains("What is a borrow checker?"));
    }
}
