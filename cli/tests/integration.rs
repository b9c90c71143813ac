use std::io::Write;

use assert_cmd::Command;

fn bin() -> Command {
    Command::cargo_bin("pg_stage").unwrap()
}

#[test]
fn column_null_directive_rewrites_row_over_stdin() {
    let input = "COMMENT ON COLUMN t.email IS 'anon: [{\"mutation_name\":\"null\"}]';\n\
                 COPY t (id,email) FROM stdin;\n\
                 1\tfoo@x\n\
                 \\.\n";

    let mut cmd = bin();
    cmd.write_stdin(input);
    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("1\t\\N"));
    assert!(!text.contains("foo@x"));
}

#[test]
fn cli_delimiter_flag_overrides_config_file_delimiter() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("pg_stage.toml");
    let mut config_file = std::fs::File::create(&config_path).unwrap();
    writeln!(config_file, "delimiter = \";\"").unwrap();

    let input = "COPY t (id,val) FROM stdin;\n1,unchanged\n\\.\n";

    let mut cmd = bin();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("--delimiter")
        .arg(",");
    cmd.write_stdin(input);
    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("1,unchanged"));
}

#[test]
fn unknown_config_mode_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("pg_stage.toml");
    std::fs::write(&config_path, "mode = \"bogus\"\n").unwrap();

    let mut cmd = bin();
    cmd.arg("--config").arg(&config_path);
    cmd.write_stdin("");
    cmd.assert().failure();
}

#[test]
fn table_delete_directive_suppresses_all_rows() {
    let input = "COMMENT ON TABLE table_1 IS 'anon: {\"mutation_name\": \"delete\"}';\n\
                 COPY table_1 (id,message) FROM stdin;\n\
                 1\thello\n\
                 2\tworld\n\
                 \\.\n";

    let mut cmd = bin();
    cmd.write_stdin(input);
    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).unwrap();
    assert!(!text.contains("hello"));
    assert!(!text.contains("world"));
    assert!(text.contains("COPY table_1"));
    assert!(text.contains("\\."));
}
