use tracing::{debug, info};

use super::{GenerationOptions, Generator};
use crate::Result;
use crate::config::Config;

/// Returned instead of an answer when the safeguard rejects a question
pub const OFF_TOPIC_ANSWER: &str =
    "This question does not seem to be about the documented product, so I cannot answer it.";

/// Cheap yes/no check that a question concerns the documented product
#[derive(Debug, Clone)]
pub struct Safeguard {
    generator: Generator,
    model: String,
    product_name: String,
}

impl Safeguard {
    #[inline]
    pub fn new(
        generator: Generator,
        model: impl Into<String>,
        product_name: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            model: model.into(),
            product_name: product_name.into(),
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Generator::from_config(config)?,
            config.ollama.safeguard_model.clone(),
            config.pipeline.product_name.clone(),
        ))
    }

    #[inline]
    pub fn prompt(&self, question: &str) -> String {
        format!(
            "You are a filter placed in front of a documentation assistant.\n\
             The assistant only answers questions about {product}.\n\n\
             Assume the user is reading the official {product} documentation.\n\
             Decide whether the following question is meant to be about {product}.\n\n\
             Answer strictly with \"yes\" or \"no\". Do not explain.\n\n\
             Question: {question}\n\
             Answer:",
            product = self.product_name,
            question = question
        )
    }

    /// True only when the model answers exactly "yes"
    #[inline]
    pub async fn is_relevant(&self, question: &str) -> Result<bool> {
        let options = GenerationOptions {
            temperature: 0.0,
            stop: Some(vec!["\n".to_string()]),
            max_tokens: Some(2),
        };

        let answer = self
            .generator
            .generate(&self.prompt(question), &self.model, &options)
            .await?;
        let relevant = answer.trim().eq_ignore_ascii_case("yes");

        if relevant {
            debug!("Safeguard accepted question");
        } else {
            info!("Safeguard rejected question (model said {:?})", answer.trim());
        }
        Ok(relevant)
    }
}
