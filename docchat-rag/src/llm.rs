//! Language model trait for prompt → text generation.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::Result;

/// A text generation backend.
///
/// The prompt is opaque to the model; everything it needs is rendered into it
/// by the prompt assembler. Failures use [`RagError::ModelUnreachable`],
/// [`RagError::ModelTimeout`], or [`RagError::ModelError`].
///
/// [`RagError::ModelUnreachable`]: crate::RagError::ModelUnreachable
/// [`RagError::ModelTimeout`]: crate::RagError::ModelTimeout
/// [`RagError::ModelError`]: crate::RagError::ModelError
///
/// # Example
///
/// ```rust,ignore
/// use docchat_rag::LanguageModel;
///
/// let answer = model.generate("Soru: ...").await?;
/// let mut fragments = model.generate_stream("Soru: ...").await?;
/// while let Some(fragment) = fragments.next().await {
///     print!("{}", fragment?);
/// }
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Generate the full completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate the completion as a finite stream of fragments.
    ///
    /// The stream ends when generation is complete. The default
    /// implementation yields the result of [`generate`](LanguageModel::generate)
    /// as a single fragment.
    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let text = self.generate(prompt).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }

    /// Check that the backend is reachable and ready.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl LanguageModel for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &str) -> Result<String> {
            Ok(prompt.to_uppercase())
        }
    }

    #[tokio::test]
    async fn default_stream_yields_one_fragment() {
        let fragments: Vec<String> = Echo
            .generate_stream("merhaba")
            .await
            .unwrap()
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["MERHABA".to_string()]);
        assert!(Echo.health_check().await.is_ok());
    }
}
