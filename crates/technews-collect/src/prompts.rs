//! Prompt templates handed to the fetch agent. Every template asks for a
//! fenced JSON object with an `articles` array so the extraction cascade has
//! a predictable best case.

const JSON_SHAPE: &str = r#"Respond with a fenced ```json block containing:
{"articles": [{"title": "...", "url": "...", "summary": "...", "published_at": "...", "date_meta_content": "..."}]}
Use absolute URLs. Omit fields you cannot determine. Do not invent articles."#;

/// Prompt for fetching a fixed page of a known source.
#[must_use]
pub fn direct_fetch(source_name: &str, url: &str, max_articles: usize) -> String {
    format!(
        "Fetch {url} and list up to {max_articles} of the newest technical articles \
         published on {source_name}. Include each article's publication date if the page \
         shows one (look at meta tags and visible timestamps).\n{JSON_SHAPE}"
    )
}

/// Prompt for a general web search.
#[must_use]
pub fn search(query: &str, max_articles: usize) -> String {
    format!(
        "Search the web for: {query}\nReturn up to {max_articles} recent technical \
         articles. Carry over each result's date snippet (for example \"2 days ago\") \
         into date_meta_content.\n{JSON_SHAPE}"
    )
}

/// Prompt for a Twitter-style account search.
#[must_use]
pub fn twitter_search(query: &str, max_articles: usize) -> String {
    format!(
        "Search recent posts matching: {query}\nReturn up to {max_articles} posts that \
         link to technical articles, using the linked article's title and URL. Put the \
         post's relative timestamp into date_meta_content.\n{JSON_SHAPE}"
    )
}

/// One-shot repair prompt: re-emit the previous response as strict JSON.
#[must_use]
pub fn strict_json(raw: &str) -> String {
    format!(
        "The following text should contain a list of articles but could not be parsed. \
         Re-emit it as strict JSON only — a single object with an \"articles\" array and \
         no surrounding prose:\n\n{raw}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_fetch_mentions_url_and_limit() {
        let prompt = direct_fetch("Hacker News", "https://news.ycombinator.com/", 15);
        assert!(prompt.contains("https://news.ycombinator.com/"));
        assert!(prompt.contains("15"));
        assert!(prompt.contains("```json"));
    }

    #[test]
    fn strict_json_embeds_prior_content() {
        let prompt = strict_json("some broken output");
        assert!(prompt.contains("some broken output"));
        assert!(prompt.contains("strict JSON"));
    }
}
