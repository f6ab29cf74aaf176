//! Chat framing for product conversations
//!
//! The extracted page text is injected verbatim.

const PERSONA: &str = "You are a helpful voice assistant for an e-commerce store. \
Here is the scraped content from a product page that you need to help customers with:";

/// Framing for the first assistant turn after the page is loaded
#[must_use]
pub fn product_introduction(context: &str) -> String {
    format!(
        "{PERSONA}

PRODUCT PAGE CONTENT:
{context}

Please provide a friendly, helpful introduction about this product that I can speak to \
customers. Focus on the key features, benefits, and why they might want to buy it. Keep it \
conversational and engaging, as if you're talking directly to a potential customer."
    )
}

/// Framing for a customer question
///
/// Falls back to a generic assistant framing when no page is loaded.
#[must_use]
pub fn customer_question(context: Option<&str>, question: &str) -> String {
    match context {
        Some(context) => format!(
            "{PERSONA}

PRODUCT PAGE CONTENT:
{context}

The user just asked: {question}

Please respond to the customer's question or request in a helpful, friendly manner. You can \
answer questions about the product, provide recommendations, or help with any other e-commerce \
related queries."
        ),
        None => format!("You are a helpful voice assistant. Please respond to the user's question: {question}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_introduction_embeds_context() {
        let framed = product_introduction("Blue Widget, $10");
        assert!(framed.contains("PRODUCT PAGE CONTENT:\nBlue Widget, $10\n"));
        assert!(framed.contains("introduction"));
    }

    #[test]
    fn test_question_embeds_context_and_question() {
        let framed = customer_question(Some("Blue Widget, $10"), "what color is it?");
        assert!(framed.contains("Blue Widget, $10"));
        assert!(framed.contains("The user just asked: what color is it?"));
    }

    #[test]
    fn test_question_without_context() {
        let framed = customer_question(None, "hello?");
        assert!(framed.ends_with("hello?"));
        assert!(!framed.contains("PRODUCT PAGE CONTENT"));
    }
}
