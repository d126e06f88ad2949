use std::process::Command;

fn pagemark() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pagemark"));
    cmd.env_remove("PAGEMARK_ENV_FILE")
        .env_remove("PAGEMARK_HIGHLIGHT_COLOR");
    cmd
}

#[test]
fn highlight_wraps_matches_and_reports() {
    let tmp = tempfile::tempdir().unwrap();
    let page = tmp.path().join("page.html");
    let out_path = tmp.path().join("out").join("page.html");
    std::fs::write(
        &page,
        "<html><body><p>Rust is fast. RUST is safe.</p><p>nothing</p></body></html>",
    )
    .unwrap();

    let out = pagemark()
        .args(["highlight", "--text", "rust", "--color", "orange", "--file"])
        .arg(&page)
        .arg("--out")
        .arg(&out_path)
        .output()
        .expect("run pagemark highlight");
    assert!(out.status.success(), "highlight failed: {}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse report json");
    assert_eq!(v["kind"].as_str(), Some("highlight"));
    assert_eq!(v["report"]["markers"].as_u64(), Some(2));
    assert_eq!(v["report"]["scrolled"].as_bool(), Some(true));

    let html = std::fs::read_to_string(&out_path).unwrap();
    assert_eq!(html.matches("class=\"search-highlight\"").count(), 2);
    assert!(html.contains("background-color: orange;"));
    assert!(html.contains(">RUST</span>"));
}

#[test]
fn highlight_message_json_prints_html() {
    let tmp = tempfile::tempdir().unwrap();
    let page = tmp.path().join("page.html");
    std::fs::write(&page, "<body><p>find the needle</p></body>").unwrap();

    let out = pagemark()
        .args([
            "highlight",
            "--message",
            r#"{"type":"highlight","text":"Needle"}"#,
            "--file",
        ])
        .arg(&page)
        .output()
        .expect("run pagemark highlight --message");
    assert!(out.status.success());
    let html = String::from_utf8_lossy(&out.stdout);
    assert!(html.contains(r#"<span class="search-highlight""#));
    assert!(html.contains("background-color: yellow;"));
    assert!(html.contains(">needle</span>"));
}

#[test]
fn highlight_message_with_out_reports_like_text() {
    let tmp = tempfile::tempdir().unwrap();
    let page = tmp.path().join("page.html");
    let out_path = tmp.path().join("hl.html");
    std::fs::write(&page, "<body><p>Needle, needle.</p></body>").unwrap();

    let out = pagemark()
        .args([
            "highlight",
            "--message",
            r#"{"type":"highlight","text":"needle"}"#,
            "--color",
            "orange",
            "--file",
        ])
        .arg(&page)
        .arg("--out")
        .arg(&out_path)
        .output()
        .expect("run pagemark highlight --message --out");
    assert!(out.status.success(), "highlight failed: {}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse report json");
    assert_eq!(v["kind"].as_str(), Some("highlight"));
    assert_eq!(v["report"]["markers"].as_u64(), Some(2));
    assert_eq!(v["report"]["scrolled"].as_bool(), Some(true));
    let html = std::fs::read_to_string(&out_path).unwrap();
    assert!(html.contains("background-color: orange;"));
}

#[test]
fn message_color_falls_back_to_env_default() {
    let tmp = tempfile::tempdir().unwrap();
    let page = tmp.path().join("page.html");
    std::fs::write(&page, "<body><p>find the needle</p></body>").unwrap();

    let out = pagemark()
        .args(["highlight", "--message", r#"{"type":"highlight","text":"needle"}"#, "--file"])
        .arg(&page)
        .env("PAGEMARK_HIGHLIGHT_COLOR", "lightblue")
        .output()
        .expect("run pagemark highlight --message");
    assert!(out.status.success());
    let html = String::from_utf8_lossy(&out.stdout);
    assert!(html.contains("background-color: lightblue;"), "got {html}");

    let out = pagemark()
        .args([
            "highlight",
            "--message",
            r#"{"type":"highlight","text":"needle","color":"pink"}"#,
            "--file",
        ])
        .arg(&page)
        .env("PAGEMARK_HIGHLIGHT_COLOR", "lightblue")
        .output()
        .expect("run pagemark highlight --message");
    assert!(String::from_utf8_lossy(&out.stdout).contains("background-color: pink;"));
}

#[test]
fn rehighlighting_clears_previous_markers() {
    let tmp = tempfile::tempdir().unwrap();
    let page = tmp.path().join("page.html");
    let first = tmp.path().join("first.html");
    let second = tmp.path().join("second.html");
    std::fs::write(&page, "<body><p>alpha beta alpha</p></body>").unwrap();

    let run = |input: &std::path::Path, text: &str, out: &std::path::Path| {
        let o = pagemark()
            .args(["highlight", "--text", text, "--file"])
            .arg(input)
            .arg("--out")
            .arg(out)
            .output()
            .expect("run pagemark highlight");
        assert!(o.status.success());
        serde_json::from_slice::<serde_json::Value>(&o.stdout).unwrap()
    };

    let r1 = run(&page, "alpha", &first);
    assert_eq!(r1["report"]["markers"].as_u64(), Some(2));
    let r2 = run(&first, "beta", &second);
    assert_eq!(r2["report"]["cleared"].as_u64(), Some(2));
    assert_eq!(r2["report"]["markers"].as_u64(), Some(1));

    let html = std::fs::read_to_string(&second).unwrap();
    assert_eq!(html.matches("search-highlight").count(), 1);
    assert!(html.contains(">beta</span>"));
}

#[test]
fn highlight_requires_text_or_message() {
    let out = pagemark()
        .args(["highlight", "--file", "x.html"])
        .output()
        .expect("run pagemark highlight");
    assert!(!out.status.success());
}
