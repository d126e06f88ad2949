#[test]
fn pagemark_version_contract() {
    let bin = assert_cmd::cargo::cargo_bin!("pagemark");
    let out = std::process::Command::new(bin)
        .args(["version"])
        .env_remove("PAGEMARK_ENV_FILE")
        .output()
        .expect("run pagemark version");

    assert!(out.status.success(), "pagemark version failed");
    let s = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse version json");

    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["kind"].as_str(), Some("version"));
    assert_eq!(v["name"].as_str(), Some("pagemark"));
    assert!(!v["version"].as_str().unwrap_or("").is_empty());
}

#[test]
fn pagemark_version_text_output_contract() {
    let bin = assert_cmd::cargo::cargo_bin!("pagemark");
    assert_cmd::Command::new(bin)
        .args(["version", "--output", "text"])
        .assert()
        .success()
        .stdout(predicates::str::starts_with("pagemark "));
}
