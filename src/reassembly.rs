/// Warning message reassembly from a SIB12 log line.
///
/// Payload layout (hex digits, quoted after the marker):
/// `NN | page 0 | page 1 | ... | page N-1`, where `NN` is the page count and
/// each page is `page_width` hex characters whose last two characters give
/// the number of meaningful octets at the front of the page.
use crate::decode::DecodeBridge;
use crate::defaults::{MARKER_WARNING_SEGMENT, PAGE_COUNT_HEX};
use crate::error::DetectError;

/// One CB page cut from the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SibFragment<'a> {
    pub page_index: usize,
    pub hex_payload: &'a str,
}

/// Plaintext of a complete warning message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReassembledMessage {
    pub text: String,
}

/// Extract the quoted payload that follows the warning segment marker.
pub fn find_payload(line: &str) -> Result<&str, DetectError> {
    let at = line
        .find(MARKER_WARNING_SEGMENT)
        .ok_or(DetectError::Parse("marker not found"))?;
    let rest = &line[at + MARKER_WARNING_SEGMENT.len()..];
    let open = rest.find('"').ok_or(DetectError::Parse("opening quote missing"))?;
    let rest = &rest[open + 1..];
    let close = rest.find('"').ok_or(DetectError::Parse("closing quote missing"))?;
    Ok(&rest[..close])
}

/// Split a payload into its pages, checking the declared count against the
/// available length.
pub fn split_pages(payload: &str, page_width: usize) -> Result<Vec<SibFragment<'_>>, DetectError> {
    if page_width <= 2 {
        return Err(DetectError::Parse("page width too small"));
    }
    let count = payload
        .get(..PAGE_COUNT_HEX)
        .and_then(|nn| usize::from_str_radix(nn, 16).ok())
        .ok_or(DetectError::Parse("page count is not hex"))?;

    let body = &payload[PAGE_COUNT_HEX..];
    let needed = count * page_width;
    if body.len() < needed {
        return Err(DetectError::TruncatedMessage {
            pages: count,
            needed,
            have: body.len(),
        });
    }

    (0..count)
        .map(|page_index| {
            let page = body
                .get(page_index * page_width..(page_index + 1) * page_width)
                .ok_or(DetectError::Parse("page is not ASCII"))?;
            Ok(SibFragment {
                page_index,
                hex_payload: page,
            })
        })
        .collect()
}

impl SibFragment<'_> {
    /// The meaningful hex at the front of the page, as told by its length octet.
    pub fn content(&self) -> Result<&str, DetectError> {
        let width = self
            .hex_payload
            .len()
            .checked_sub(2)
            .ok_or(DetectError::Parse("page too short"))?;
        let octets = self
            .hex_payload
            .get(width..)
            .and_then(|len| usize::from_str_radix(len, 16).ok())
            .ok_or(DetectError::Parse("page length is not hex"))?;
        if octets * 2 > width {
            return Err(DetectError::Parse("page length exceeds page"));
        }
        Ok(&self.hex_payload[..octets * 2])
    }
}

/// Reassemble the warning message carried by `line`.
///
/// Pages are decoded in order and concatenated; zero pages yield empty text.
pub fn reassemble(
    line: &str,
    page_width: usize,
    decoder: &dyn DecodeBridge,
) -> Result<ReassembledMessage, DetectError> {
    let payload = find_payload(line)?;
    let pages = split_pages(payload, page_width)?;

    let mut text = String::new();
    for page in &pages {
        let content = page.content()?;
        if content.is_empty() {
            log::debug!("Warning page {}/{} is empty", page.page_index + 1, pages.len());
            continue;
        }
        let decoded = decoder.decode(content)?;
        log::debug!("Warning page {}/{}: {:?}", page.page_index + 1, pages.len(), decoded);
        text.push_str(&decoded);
    }
    Ok(ReassembledMessage { text })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::decode::{CbsDecoder, Coding};
    use crate::defaults::PAGE_WIDTH_HEX;
    use std::sync::Mutex;

    /// Build one page: `text` as hex, CR padding, trailing length octet.
    pub(crate) fn page(text: &str, width: usize) -> String {
        let mut hex: String = text.bytes().map(|b| format!("{:02X}", b)).collect();
        while hex.len() < width - 2 {
            hex.push_str("0D");
        }
        hex.push_str(&format!("{:02X}", text.len()));
        hex
    }

    /// Build one page from already encoded `hex` with zero padding.
    pub(crate) fn packed_page(hex: &str, width: usize) -> String {
        format!("{}{}{:02X}", hex, "0".repeat(width - 2 - hex.len()), hex.len() / 2)
    }

    pub(crate) fn sib_line(pages: &[&str], width: usize) -> String {
        let pages: Vec<String> = pages.iter().map(|p| page(p, width)).collect();
        sib_line_pages(&pages)
    }

    pub(crate) fn sib_line_pages(pages: &[String]) -> String {
        let mut payload = format!("{:02X}", pages.len());
        for p in pages {
            payload.push_str(p);
        }
        format!(
            "Tue Oct 18 10:00:00 2026 [RRC ] D warningMessageSegment-r9 : \"{}\",",
            payload
        )
    }

    /// Decoder that records every fragment and echoes a page marker.
    struct Recorder(Mutex<Vec<String>>);

    impl DecodeBridge for Recorder {
        fn decode(&self, fragment_hex: &str) -> Result<String, DetectError> {
            self.0.lock().unwrap().push(fragment_hex.to_string());
            Ok("|".to_string())
        }
    }

    #[test]
    fn reassembles_pages_in_order() {
        let line = sib_line(&["Flood ", "warning"], PAGE_WIDTH_HEX);
        let msg = reassemble(&line, PAGE_WIDTH_HEX, &CbsDecoder::new(Coding::Utf8)).unwrap();
        assert_eq!(msg.text, "Flood warning");
    }

    #[test]
    fn decoder_sees_one_fragment_per_page() {
        let line = sib_line(&["a", "b", "c"], PAGE_WIDTH_HEX);
        let recorder = Recorder(Mutex::new(Vec::new()));
        let msg = reassemble(&line, PAGE_WIDTH_HEX, &recorder).unwrap();
        assert_eq!(msg.text.matches('|').count(), 3);
        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen, vec!["61", "62", "63"]);
    }

    #[test]
    fn zero_pages_is_empty_text() {
        let line = sib_line(&[], PAGE_WIDTH_HEX);
        let msg = reassemble(&line, PAGE_WIDTH_HEX, &CbsDecoder::default()).unwrap();
        assert_eq!(msg.text, "");
    }

    #[test]
    fn honours_configured_page_width() {
        let line = sib_line(&["abc", "de"], 12);
        let msg = reassemble(&line, 12, &CbsDecoder::new(Coding::Utf8)).unwrap();
        assert_eq!(msg.text, "abcde");
    }

    #[test]
    fn missing_marker_is_parse_error() {
        let err = find_payload("Authentication Request \"00\"").unwrap_err();
        assert_eq!(err, DetectError::Parse("marker not found"));
    }

    #[test]
    fn missing_closing_quote_is_parse_error() {
        let err = find_payload("warningMessageSegment-r9 : \"0141").unwrap_err();
        assert_eq!(err, DetectError::Parse("closing quote missing"));
    }

    #[test]
    fn missing_opening_quote_is_parse_error() {
        let err = find_payload("warningMessageSegment-r9 : 0141").unwrap_err();
        assert_eq!(err, DetectError::Parse("opening quote missing"));
    }

    #[test]
    fn short_payload_is_truncated_error() {
        let mut line = sib_line(&["one", "two"], PAGE_WIDTH_HEX);
        // Drop the second page but keep the declared count of two.
        let cut = line.find(",").unwrap();
        line.replace_range(cut - 1 - PAGE_WIDTH_HEX..cut - 1, "");
        let err = reassemble(&line, PAGE_WIDTH_HEX, &CbsDecoder::default()).unwrap_err();
        assert_eq!(
            err,
            DetectError::TruncatedMessage {
                pages: 2,
                needed: 2 * PAGE_WIDTH_HEX,
                have: PAGE_WIDTH_HEX,
            }
        );
    }

    #[test]
    fn non_hex_count_is_parse_error() {
        let err = split_pages("zz", PAGE_WIDTH_HEX).unwrap_err();
        assert_eq!(err, DetectError::Parse("page count is not hex"));
    }

    #[test]
    fn oversized_page_length_is_parse_error() {
        let mut payload = String::from("01");
        payload.push_str("4142FF");
        let pages = split_pages(&payload, 6).unwrap();
        assert_eq!(pages[0].content(), Err(DetectError::Parse("page length exceeds page")));
    }

    struct Broken;

    impl DecodeBridge for Broken {
        fn decode(&self, _fragment_hex: &str) -> Result<String, DetectError> {
            Err(DetectError::DecodeUnavailable("decoder missing".into()))
        }
    }

    #[test]
    fn decode_failure_propagates() {
        let line = sib_line(&["x"], PAGE_WIDTH_HEX);
        let err = reassemble(&line, PAGE_WIDTH_HEX, &Broken).unwrap_err();
        assert!(matches!(err, DetectError::DecodeUnavailable(_)));
    }

    #[test]
    fn empty_page_is_skipped_not_decoded() {
        let line = sib_line(&["a", "", "b"], PAGE_WIDTH_HEX);
        let recorder = Recorder(Mutex::new(Vec::new()));
        let msg = reassemble(&line, PAGE_WIDTH_HEX, &recorder).unwrap();
        assert_eq!(msg.text, "||");
        assert_eq!(*recorder.0.lock().unwrap(), vec!["61", "62"]);
    }

    #[test]
    fn gsm7_pages_with_empty_page() {
        let pages = [packed_page("E8329BFD06", PAGE_WIDTH_HEX), packed_page("", PAGE_WIDTH_HEX)];
        let msg = reassemble(&sib_line_pages(&pages), PAGE_WIDTH_HEX, &CbsDecoder::default()).unwrap();
        assert_eq!(msg.text, "hello");
    }
}
