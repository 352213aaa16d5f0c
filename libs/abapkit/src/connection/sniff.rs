//! Content type detection for responses without a `content-type` header.

/// Tags that mark a document as HTML when they open it.
const HTML_TAGS: &[&[u8]] = &[
    b"<!doctype html",
    b"<html",
    b"<head",
    b"<script",
    b"<iframe",
    b"<h1",
    b"<div",
    b"<font",
    b"<table",
    b"<a",
    b"<style",
    b"<title",
    b"<b",
    b"<body",
    b"<br",
    b"<p",
    b"<!--",
];

const SNIFF_LEN: usize = 512;

/// `true` if the leading bytes look like an HTML document.
///
/// A tag only matches when followed by a space or `>`, so `<abap>` is not
/// mistaken for `<a>`. Empty input is not HTML.
#[must_use]
pub fn looks_like_html(body: &[u8]) -> bool {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let head = &body[start..body.len().min(start + SNIFF_LEN)];

    HTML_TAGS.iter().any(|tag| {
        head.len() > tag.len()
            && head[..tag.len()].eq_ignore_ascii_case(tag)
            && matches!(head[tag.len()], b' ' | b'>')
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn detects_html_documents() {
        assert!(looks_like_html(b"<!DOCTYPE html>\n<html>"));
        assert!(looks_like_html(b"  \r\n<HTML lang=\"en\">"));
        assert!(looks_like_html(b"\xEF\xBB\xBF<html>"));
        assert!(looks_like_html(b"<body onload=\"x()\">"));
        assert!(looks_like_html(b"<!-- login --><form>"));
    }

    #[test]
    fn other_content_is_not_html() {
        assert!(!looks_like_html(b""));
        assert!(!looks_like_html(b"   "));
        assert!(!looks_like_html(br#"{"d":{"results":[]}}"#));
        assert!(!looks_like_html(b"<?xml version=\"1.0\"?><edmx:Edmx>"));
        assert!(!looks_like_html(b"<abap>"));
        assert!(!looks_like_html(b"<html"));
    }
}
