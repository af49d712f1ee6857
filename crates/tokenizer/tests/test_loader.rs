use indoc::indoc;
use tokenizer::{Tokenizer, TokenizerError, TokenizerKind, Trainer};

const GO_SOURCE: &str = indoc! {r#"
    package main

    import "fmt"

    func main() {
        for i := 0; i < 3; i++ {
            fmt.Println("hello", i)
        }
    }
"#};

const HF_CONFIG: &str = r#"{
    "version": "1.0",
    "truncation": null,
    "padding": null,
    "added_tokens": [],
    "normalizer": null,
    "pre_tokenizer": {"type": "Whitespace"},
    "post_processor": null,
    "decoder": null,
    "model": {
        "type": "WordLevel",
        "vocab": {"[UNK]": 0, "</s>": 1, "package": 2, "main": 3},
        "unk_token": "[UNK]"
    }
}"#;

fn write_configs(dir: &tempfile::TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
    let gopilot_path = dir.path().join("gopilot.json");
    Trainer::new(450, 1, Trainer::default_special_tokens())
        .train_sources(&[GO_SOURCE.to_string()])
        .unwrap()
        .save(&gopilot_path)
        .unwrap();

    let hf_path = dir.path().join("tokenizer.json");
    std::fs::write(&hf_path, HF_CONFIG).unwrap();
    (gopilot_path, hf_path)
}

#[test]
fn gopilot_kind_loads_gopilot_tokenizer() {
    let dir = tempfile::tempdir().unwrap();
    let (gopilot_path, _) = write_configs(&dir);

    let tok = TokenizerKind::Gopilot.load(&gopilot_path).unwrap();
    assert!(matches!(tok, Tokenizer::Gopilot(_)));
    let ids = tok.encode(GO_SOURCE).unwrap();
    assert_eq!(tok.decode(&ids).unwrap(), GO_SOURCE);
    assert!(tok.eos_id().is_some());
}

#[test]
fn hugging_face_kind_loads_hugging_face_tokenizer() {
    let dir = tempfile::tempdir().unwrap();
    let (_, hf_path) = write_configs(&dir);

    let tok = TokenizerKind::HuggingFace.load(&hf_path).unwrap();
    assert!(matches!(tok, Tokenizer::HuggingFace(_)));
    assert_eq!(tok.encode("package main").unwrap(), vec![2, 3]);
    // no dedicated pad token, so padding reuses end-of-sequence
    assert_eq!(tok.pad_id(), Some(1));
}

#[test]
fn each_kind_loads_with_the_other_config_removed() {
    let dir = tempfile::tempdir().unwrap();
    let (gopilot_path, hf_path) = write_configs(&dir);

    std::fs::remove_file(&hf_path).unwrap();
    let tok = TokenizerKind::Gopilot.load(&gopilot_path).unwrap();
    assert_eq!(tok.kind(), TokenizerKind::Gopilot);

    std::fs::write(&hf_path, HF_CONFIG).unwrap();
    std::fs::remove_file(&gopilot_path).unwrap();
    let tok = TokenizerKind::HuggingFace.load(&hf_path).unwrap();
    assert_eq!(tok.kind(), TokenizerKind::HuggingFace);
}

#[test]
fn missing_gopilot_config_error_names_the_file() {
    let err = TokenizerKind::Gopilot.load("/nonexistent/gopilot-tok.json").unwrap_err();
    assert!(matches!(err, TokenizerError::Io { .. }), "{err}");
    assert!(err.to_string().contains("/nonexistent/gopilot-tok.json"), "{err}");
}

#[test]
fn loaders_do_not_accept_each_others_files() {
    let dir = tempfile::tempdir().unwrap();
    let (gopilot_path, hf_path) = write_configs(&dir);

    let err = TokenizerKind::Gopilot.load(&hf_path).unwrap_err();
    assert!(matches!(err, TokenizerError::Config { .. }), "{err}");
    let err = TokenizerKind::HuggingFace.load(&gopilot_path).unwrap_err();
    assert!(matches!(err, TokenizerError::Config { .. }), "{err}");
}
