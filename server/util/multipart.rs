/// Returns the index of the first occurrence of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits `haystack` on every occurrence of `needle`, returning the pieces
/// between occurrences (excluding the needle itself).
pub fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut result = Vec::new();
    let mut start = 0;
    while start <= haystack.len() {
        if let Some(pos) = find_subsequence(&haystack[start..], needle) {
            result.push(&haystack[start..start + pos]);
            start += pos + needle.len();
        } else {
            result.push(&haystack[start..]);
            break;
        }
    }
    result
}

/// Extracts the boundary token from a Content-Type header value like
/// `multipart/form-data; boundary=----WebKitFormBoundaryXXX`.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(|s| s.trim())
        .find(|s| s.starts_with("boundary="))
        .map(|s| s["boundary=".len()..].trim_matches('"').to_owned())
}

/// One form part: its Content-Disposition header block and its body.
struct Part<'a> {
    headers: String,
    data: &'a [u8],
}

fn parts<'a>(body: &'a [u8], boundary: &str) -> Vec<Part<'a>> {
    let delimiter = format!("--{}", boundary);
    let sep = b"\r\n\r\n";
    split_on(body, delimiter.as_bytes())
        .into_iter()
        .filter_map(|part| {
            let sep_pos = find_subsequence(part, sep)?;
            let raw = &part[sep_pos + sep.len()..];
            Some(Part {
                headers: String::from_utf8_lossy(&part[..sep_pos]).into_owned(),
                data: raw.strip_suffix(b"\r\n").unwrap_or(raw),
            })
        })
        .collect()
}

/// Extracts the raw bytes of the file part named `field_name`, falling back
/// to the first file part when no part has that name.
pub fn extract_file(body: &[u8], boundary: &str, field_name: &str) -> Option<Vec<u8>> {
    let files: Vec<Part> = parts(body, boundary)
        .into_iter()
        .filter(|p| p.headers.contains("filename="))
        .collect();
    let wanted = format!("name=\"{}\"", field_name);
    files
        .iter()
        .find(|p| p.headers.contains(&wanted))
        .or_else(|| files.first())
        .map(|p| p.data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, filename, data) in parts {
            out.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            match filename {
                Some(f) => out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\r\n", name, f).as_bytes(),
                ),
                None => out.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes()),
            }
            out.extend_from_slice(data);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
        out
    }

    #[test]
    fn boundary_from_content_type() {
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=\"abc123\"").as_deref(),
            Some("abc123")
        );
        assert_eq!(extract_boundary("application/octet-stream"), None);
    }

    #[test]
    fn named_file_field_wins() {
        let b = body("xyz", &[("note", None, &b"hi"[..]), ("other", Some("a.png"), &b"AAA"[..]), ("file", Some("b.png"), &b"\x89PNG"[..])]);
        assert_eq!(extract_file(&b, "xyz", "file"), Some(b"\x89PNG".to_vec()));
    }

    #[test]
    fn falls_back_to_first_file() {
        let b = body("xyz", &[("note", None, &b"hi"[..]), ("upload", Some("a.jpg"), &b"JPG"[..])]);
        assert_eq!(extract_file(&b, "xyz", "file"), Some(b"JPG".to_vec()));
        let b = body("xyz", &[("note", None, &b"hi"[..])]);
        assert_eq!(extract_file(&b, "xyz", "file"), None);
    }
}
