use crate::clean::collapse_whitespace;
use crate::context::TypingContext;
use sg_core::Typed;
use url::Url;

/// Parses/normalizes a generic `url` or `image_url` field.
///
/// Requires a scheme and host. Strips `ctx.tracking_query_params` and,
/// when `ctx.force_https` is set, upgrades `http://` to `https://`.
///
/// Confidence: 0.95 if parsed with scheme+host; 0 otherwise. `image_url`
/// additionally degrades confidence slightly when the path has no
/// recognizable image extension, since the field is still plausibly an
/// image URL behind a redirect or CDN rewrite.
pub fn type_url(raw: &str, ctx: &TypingContext, is_image: bool) -> Typed {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() {
        return Typed::failed(raw, "invalid_format");
    }

    let mut parsed = match Url::parse(&cleaned) {
        Ok(u) => u,
        Err(_) => return Typed::failed(raw, "invalid_format"),
    };

    if parsed.host_str().is_none() {
        return Typed::failed(raw, "missing_host");
    }
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Typed::failed(raw, "unsupported_scheme");
    }

    let mut reasons = vec!["parsed_url".to_string()];

    if ctx.force_https && parsed.scheme() == "http" {
        let _ = parsed.set_scheme("https");
        reasons.push("upgraded_https".to_string());
    }

    let to_strip: Vec<String> = parsed
        .query_pairs()
        .filter(|(k, _)| ctx.tracking_query_params.iter().any(|p| p == k))
        .map(|(k, _)| k.into_owned())
        .collect();
    if !to_strip.is_empty() {
        let kept: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(k, _)| !to_strip.contains(&k.to_string()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            parsed.set_query(None);
        } else {
            let qs = kept
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            parsed.set_query(Some(&qs));
        }
        reasons.push("stripped_tracking_params".to_string());
    }

    let mut confidence = 0.95;
    if is_image {
        const IMAGE_EXTS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".bmp", ".avif"];
        let path_lower = parsed.path().to_lowercase();
        if IMAGE_EXTS.iter().any(|ext| path_lower.ends_with(ext)) {
            reasons.push("recognized_image_extension".to_string());
        } else {
            confidence = 0.75;
        }
    }

    Typed {
        value: Some(serde_json::json!(parsed.to_string())),
        raw: raw.to_string(),
        confidence,
        reasons,
        errors: vec![],
    }
}
