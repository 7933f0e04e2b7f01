use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::document::Document;
use crate::core::config::DEFAULT_PROMPT_TEMPLATE;

const NO_REVIEWS: &str = "(no relevant reviews found)";

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{(reviews|question)\}").expect("static placeholder regex"))
}

/// Fills the answering prompt with retrieved reviews and the user's question.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_TEMPLATE)
    }
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Both placeholders are replaced in a single pass, so braces inside a
    /// review or question are never expanded a second time.
    pub fn build(&self, reviews: &[Document], question: &str) -> String {
        let formatted = format_reviews(reviews);
        placeholder_pattern()
            .replace_all(&self.template, |caps: &Captures| match &caps[1] {
                "reviews" => formatted.clone(),
                _ => question.to_string(),
            })
            .into_owned()
    }
}

/// One line per review: rating, date, then the body.
pub fn format_reviews(reviews: &[Document]) -> String {
    if reviews.is_empty() {
        return NO_REVIEWS.to_string();
    }

    reviews
        .iter()
        .map(|doc| {
            format!(
                "- [{}/5, {}] {}",
                doc.metadata.rating, doc.metadata.date, doc.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reviews_and_question_land_in_the_template() {
        let builder = PromptBuilder::new("Reviews: {reviews}\nQuestion: {question}");
        let reviews = vec![
            Document::from_review(0, "Great pizza", "Loved the crust", 5.0, "2024-01-01"),
            Document::from_review(3, "Meh", "Soggy base", 2.5, "2024-02-11"),
        ];

        let prompt = builder.build(&reviews, "How is the crust?");
        assert_eq!(
            prompt,
            "Reviews: - [5/5, 2024-01-01] Great pizza Loved the crust\n\
             - [2.5/5, 2024-02-11] Meh Soggy base\n\
             Question: How is the crust?"
        );
    }

    #[test]
    fn placeholders_inside_values_stay_literal() {
        let builder = PromptBuilder::new("{reviews} | {question}");
        let prompt = builder.build(&[], "what does {reviews} mean?");
        assert_eq!(prompt, "(no relevant reviews found) | what does {reviews} mean?");
    }

    #[test]
    fn default_template_mentions_the_restaurant() {
        let prompt = PromptBuilder::default().build(&[], "Any vegan options?");
        assert!(prompt.contains("pizza restaurant"));
        assert!(prompt.contains("Any vegan options?"));
        assert!(!prompt.contains("{question}"));
    }
}
