use crate::error::EngineError;

/// Turns the caller's scene description into the prompt sent for diffusion.
pub trait PromptRewriter: Send + Sync {
    fn rewrite(&self, text: &str, product_codes: &[String]) -> Result<String, EngineError>;
}

/// Appends the selected short codes as a material phrase.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureSuffixRewriter;

impl PromptRewriter for FeatureSuffixRewriter {
    fn rewrite(&self, text: &str, product_codes: &[String]) -> Result<String, EngineError> {
        if product_codes.is_empty() {
            return Ok(text.to_string());
        }
        Ok(format!(
            "{text}, featuring {} quartz marble",
            product_codes.join(" and ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_codes_with_and() -> Result<(), EngineError> {
        let rewriter = FeatureSuffixRewriter;
        assert_eq!(
            rewriter.rewrite("modern kitchen", &["C1012".to_string()])?,
            "modern kitchen, featuring C1012 quartz marble"
        );
        assert_eq!(
            rewriter.rewrite("bath", &["C1012".to_string(), "C4202".to_string()])?,
            "bath, featuring C1012 and C4202 quartz marble"
        );
        assert_eq!(rewriter.rewrite("bath", &[])?, "bath");
        Ok(())
    }
}
