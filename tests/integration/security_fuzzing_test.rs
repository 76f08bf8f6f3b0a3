// INJECTION AND TRAVERSAL FUZZING TESTS
// ======================================
// Every string that reaches a worker command line, a GPU tool invocation or
// a deletion path is fuzzed here against the validators.

use edgeboard::core::validation::{
    resolve_contained_file, validate_media_filename, BusAddress, SafeToken,
};
use std::fs;
use tempfile::TempDir;

/// Shell metacharacters that must never survive token validation
const DANGEROUS_SHELL_CHARS: &[char] = &[
    ';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r', '\\', '"', '\'', ' ', '*', '?',
];

// ============================================================================
// FUZZING: COMMAND LINE TOKENS
// ============================================================================

#[test]
fn test_fuzz_every_metachar_in_every_position() {
    for &ch in DANGEROUS_SHELL_CHARS {
        for candidate in [
            format!("{}model", ch),
            format!("mo{}del", ch),
            format!("model{}", ch),
        ] {
            assert!(
                SafeToken::argument(&candidate).is_err(),
                "argument accepted {:?}",
                candidate
            );
            assert!(
                SafeToken::identifier(&candidate).is_err(),
                "identifier accepted {:?}",
                candidate
            );
        }
    }
}

#[test]
fn test_fuzz_unicode_lookalikes() {
    let attacks = vec![
        ("Greek question mark", "model\u{037E}reboot"),
        ("Divides (pipe lookalike)", "model\u{2223}sh"),
        ("Fullwidth dollar", "\u{FF04}(id)"),
        ("Zero width space", "GPU.0\u{200B}"),
        ("Right-to-left override", "CPU\u{202E}"),
        ("Null byte", "CPU\0--evil"),
    ];

    for (name, value) in attacks {
        assert!(
            SafeToken::argument(value).is_err(),
            "{} was accepted",
            name
        );
    }
}

#[test]
fn test_fuzz_traversal_in_arguments() {
    for value in ["../../bin/sh", "/media/../etc/passwd", "..", "a/.."] {
        assert!(SafeToken::argument(value).is_err(), "{} accepted", value);
    }
    // Plain dots in model names and paths are fine
    assert!(SafeToken::argument("qwen2.5-1.5b").is_ok());
    assert!(SafeToken::argument("/opt/media/people-detection.mp4").is_ok());
}

#[test]
fn test_identifier_boundaries() {
    assert!(SafeToken::identifier(&"a".repeat(64)).is_ok());
    assert!(SafeToken::identifier(&"a".repeat(65)).is_err());
    assert!(SafeToken::identifier("").is_err());
    // Slashes are arguments, never identifiers
    assert!(SafeToken::identifier("text/generation").is_err());
}

#[test]
fn test_rejection_never_rewrites() {
    // A sanitizer that stripped bad chars would map both to "12"
    assert!(SafeToken::identifier("1;2").is_err());
    assert_eq!(SafeToken::identifier("12").unwrap().as_str(), "12");
}

// ============================================================================
// FUZZING: BUS ADDRESSES (GPU TOOL ARGUMENTS)
// ============================================================================

#[test]
fn test_fuzz_bus_addresses() {
    let valid = ["00:02.0", "0000:03:00.0", "AB:cd.7"];
    for value in valid {
        assert!(BusAddress::parse(value).is_ok(), "{} rejected", value);
    }

    let invalid = [
        "",
        "00:02.8",
        "00:02",
        "0:02.0",
        "00:02.0; rm -rf /",
        "00:02.0 -j",
        "-d 00:02.0",
        "00000:03:00.0",
        "$(id):00.0",
    ];
    for value in invalid {
        assert!(BusAddress::parse(value).is_err(), "{:?} accepted", value);
    }
}

// ============================================================================
// FUZZING: MEDIA DELETION PATHS
// ============================================================================

#[test]
fn test_fuzz_media_filenames() {
    let attacks = [
        "../x.mp4",
        "..\\x.mp4",
        "/etc/passwd",
        "sub/x.mp4",
        ".hidden.mp4",
        "x.mp4\0.txt",
        "noextension",
        "x .mp4",
        "~root.mp4",
    ];
    for name in attacks {
        assert!(validate_media_filename(name).is_err(), "{:?} accepted", name);
    }
    assert!(validate_media_filename("people_2024-01.mp4").is_ok());
}

#[test]
fn test_contained_file_in_nested_directory_is_rejected() {
    let temp = TempDir::new().unwrap();
    let media = temp.path().join("media");
    fs::create_dir_all(media.join("nested")).unwrap();
    fs::write(media.join("nested").join("x.mp4"), b"").unwrap();
    fs::write(media.join("top.mp4"), b"").unwrap();

    assert!(resolve_contained_file(&media, "nested/x.mp4").is_err());
    assert!(resolve_contained_file(&media, "top.mp4").is_ok());
    assert!(resolve_contained_file(&media, "missing.mp4").is_err());
}
