//! Flag Matcher & Enqueuer (C4, §4.4).

use regex::Regex;
use tracing::{info, warn};

use super::fallback::FallbackStore;
use super::http_client::{EnqueueResponse, ServerClient};

/// Extracts every non-overlapping match of `flag_format` from `text`.
pub fn extract_flags(flag_format: &Regex, text: &str) -> Vec<String> {
    flag_format
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Dispatches extracted flags for one `(exploit, target)` pair: enqueues
/// them with the server, falling back to local storage on transient network
/// failure (§4.4). Returns the number of newly accepted flags for logging.
pub async fn enqueue_response(
    client: &ServerClient,
    fallback: &FallbackStore,
    flag_format: &Regex,
    exploit: &str,
    target: &str,
    output: &str,
) -> usize {
    let flags = extract_flags(flag_format, output);
    if flags.is_empty() {
        info!(exploit, target, "no flags matched in output");
        return 0;
    }

    match client.enqueue(&flags, exploit, target).await {
        Ok(EnqueueResponse::Inserted { new, duplicates }) => {
            if !new.is_empty() {
                info!(exploit, target, new = new.len(), duplicates = duplicates.len(), "flags enqueued");
            }
            new.len()
        }
        Ok(EnqueueResponse::Own { own }) => {
            warn!(exploit, target, count = own, "target is own team, flags not inserted");
            0
        }
        Err(e) => {
            warn!(exploit, target, error = %e, "enqueue failed, writing to fallback store");
            for flag in &flags {
                if let Err(e) = fallback.record(flag, exploit, target) {
                    warn!(error = %e, "failed to record fallback flag");
                }
            }
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_all_non_overlapping_matches() {
        let re = Regex::new(r"FLAG\{[^}]*\}").unwrap();
        let text = "got FLAG{one} and FLAG{two} in output";
        assert_eq!(extract_flags(&re, text), vec!["FLAG{one}", "FLAG{two}"]);
    }

    #[test]
    fn no_match_yields_empty_list() {
        let re = Regex::new(r"FLAG\{[^}]*\}").unwrap();
        assert!(extract_flags(&re, "nothing here").is_empty());
    }
}
