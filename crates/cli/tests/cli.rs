use assert_cmd::Command;

fn stacks() -> Command {
    let mut cmd = Command::cargo_bin("stacks").unwrap();
    cmd.env("STACKS_ENV", "local")
        .env("STACKS_CONFIG_DIR", env!("CARGO_MANIFEST_DIR"));
    cmd
}

#[test]
fn openapi_prints_merged_document() {
    let output = stacks().arg("openapi").output().unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["info"]["title"], "Stacks API");
    assert!(doc["paths"]["/api/books/report"].is_object());
}

#[test]
fn migrations_lists_genre_seed() {
    stacks()
        .arg("migrations")
        .assert()
        .success()
        .stdout("genres/001_seed_genres\n");
}

#[test]
fn unknown_environment_fails() {
    stacks()
        .env("STACKS_ENV", "moon")
        .arg("migrations")
        .assert()
        .failure();
}
