//! Grounded prompt assembly for the language model.
use crate::retriever::RetrievedChunk;

/// Reply used when there is nothing to ground an answer on.
pub const NO_CONTEXT_REPLY: &str =
    "I couldn't find relevant information in your SOPs or uploaded documents.";

/// Characters of an uploaded document included in the prompt.
pub const UPLOADED_CONTEXT_CHARS: usize = 3000;
/// Retrieved chunks included in the prompt.
pub const MAX_PROMPT_CHUNKS: usize = 3;
/// Characters of each retrieved chunk included in the prompt.
pub const CHUNK_EXCERPT_CHARS: usize = 500;

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Build the prompt for `query`.
///
/// Uploaded document text, when present, comes first. With neither chunks
/// nor an upload the fixed [`NO_CONTEXT_REPLY`] is returned instead, so no
/// model call is needed.
#[must_use]
pub fn build_prompt(query: &str, chunks: &[RetrievedChunk], uploaded: Option<&str>) -> String {
    let uploaded = uploaded.filter(|u| !u.trim().is_empty());
    if chunks.is_empty() && uploaded.is_none() {
        return NO_CONTEXT_REPLY.to_string();
    }

    let mut context = String::new();
    if let Some(text) = uploaded {
        context.push_str("UPLOADED DOCUMENT CONTENT:\n");
        context.push_str(truncate_chars(text, UPLOADED_CONTEXT_CHARS));
        context.push_str("\n\n");
    }
    if !chunks.is_empty() {
        let excerpts: Vec<String> = chunks
            .iter()
            .take(MAX_PROMPT_CHUNKS)
            .map(|c| {
                format!(
                    "Document: {}\n{}",
                    c.metadata.source,
                    truncate_chars(&c.text, CHUNK_EXCERPT_CHARS)
                )
            })
            .collect();
        context.push_str("RELEVANT SOP DOCUMENTS:\n");
        context.push_str(&excerpts.join("\n\n"));
    }

    match (uploaded.is_some(), !chunks.is_empty()) {
        (true, true) => format!(
            "You are analyzing both an uploaded document and existing SOP documents to answer this question: \"{query}\"\n\n\
             {context}\n\n\
             Please provide a comprehensive answer that:\n\
             1. Primarily analyzes the uploaded document content in relation to the question\n\
             2. Cross-references with relevant SOP information when applicable\n\
             3. Gives specific, actionable information\n\
             4. Clearly indicates which source you're referencing"
        ),
        (true, false) => format!(
            "You are analyzing an uploaded document to answer this question: \"{query}\"\n\n\
             {context}\n\n\
             Please provide a detailed analysis of the uploaded document that:\n\
             1. Directly addresses the question asked\n\
             2. Extracts relevant information from the document\n\
             3. Provides specific details, steps, or insights from the document content\n\
             4. Organizes the information in a clear, professional manner"
        ),
        _ => format!(
            "Answer this question using the SOP documents provided: \"{query}\"\n\n\
             {context}\n\n\
             Provide a clear, professional answer with specific steps if applicable."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChunkMetadata;

    fn chunk(source: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            id: format!("{source}_0"),
            text: text.to_string(),
            metadata: ChunkMetadata {
                source: source.to_string(),
                chunk_index: 0,
                total_chunks: 1,
                file_path: source.to_string(),
                indexed_at: String::new(),
            },
            similarity: 0.9,
        }
    }

    #[test]
    fn test_no_context() {
        assert_eq!(build_prompt("q", &[], None), NO_CONTEXT_REPLY);
        assert_eq!(build_prompt("q", &[], Some("   ")), NO_CONTEXT_REPLY);
    }

    #[test]
    fn test_sop_only_prompt() {
        let chunks = vec![
            chunk("a.md", "alpha"),
            chunk("b.md", "beta"),
            chunk("c.md", "gamma"),
            chunk("d.md", "delta"),
        ];
        let prompt = build_prompt("How?", &chunks, None);

        assert!(prompt.starts_with("Answer this question using the SOP documents provided: \"How?\""));
        assert!(prompt.contains("RELEVANT SOP DOCUMENTS:\nDocument: a.md\nalpha\n\nDocument: b.md"));
        assert!(prompt.contains("Document: c.md"));
        assert!(!prompt.contains("Document: d.md"), "only three chunks are used");
        assert!(!prompt.contains("UPLOADED DOCUMENT CONTENT"));
    }

    #[test]
    fn test_excerpts_are_truncated() {
        let long = "é".repeat(CHUNK_EXCERPT_CHARS + 100);
        let prompt = build_prompt("q", &[chunk("a.md", &long)], None);
        assert!(prompt.contains(&"é".repeat(CHUNK_EXCERPT_CHARS)));
        assert!(!prompt.contains(&"é".repeat(CHUNK_EXCERPT_CHARS + 1)));
    }

    #[test]
    fn test_uploaded_only_prompt() {
        let upload = "x".repeat(UPLOADED_CONTEXT_CHARS + 10);
        let prompt = build_prompt("Summarise", &[], Some(&upload));

        assert!(prompt.starts_with("You are analyzing an uploaded document"));
        assert!(prompt.contains(&format!(
            "UPLOADED DOCUMENT CONTENT:\n{}\n",
            "x".repeat(UPLOADED_CONTEXT_CHARS)
        )));
        assert!(!prompt.contains(&"x".repeat(UPLOADED_CONTEXT_CHARS + 1)));
    }

    #[test]
    fn test_combined_prompt_puts_upload_first() {
        let prompt = build_prompt("Compare", &[chunk("a.md", "alpha")], Some("draft"));
        assert!(prompt.starts_with("You are analyzing both"));
        let upload_at = prompt.find("UPLOADED DOCUMENT CONTENT").unwrap();
        let sop_at = prompt.find("RELEVANT SOP DOCUMENTS").unwrap();
        assert!(upload_at < sop_at);
    }
}
