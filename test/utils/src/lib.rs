#![deny(clippy::implicit_return)]
#![allow(clippy::needless_return)]

use tempfile::TempDir;

/// Scratch directory for stores under test. Removed when dropped.
pub fn temp_store() -> TempDir {
    return tempfile::Builder::new()
        .prefix("wayne-test-")
        .tempdir()
        .unwrap();
}

pub fn code_fixture() -> &'static str {
    return r#"
fn fizzbuzz(n: u32) -> String {
    match (n % 3, n % 5) {
        (0, 0) => "FizzBuzz".to_string(),
        (0, _) => "Fizz".to_string(),
        (_, 0) => "Buzz".to_string(),
        _ => n.to_string(),
    }
}
"#
    .trim();
}

/// Base64 for the 8 byte PNG signature, enough to stand in for an image
/// payload.
pub fn png_fixture_b64() -> &'static str {
    return "iVBORw0KGgo=";
}
