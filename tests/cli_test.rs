use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*;
use std::process::Command; // Run programs
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// Compress and expand a generated file through the real binary and
/// require the result to match the original byte for byte.
fn round_trip_test(method: &str) -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let txt = "I am Sam. Sam I am. I do not like this Sam I am.\n".repeat(40);
    let in_path = temp_dir.path().join("original.txt");
    std::fs::write(&in_path,txt.as_bytes())?;
    let cmp_path = temp_dir.path().join("compressed.bin");
    let out_path = temp_dir.path().join("expanded.txt");

    let mut cmd = Command::cargo_bin("minicompressor")?;
    cmd.arg("compress")
        .arg("-m").arg(method)
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&cmp_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("compressed"));

    let mut cmd = Command::cargo_bin("minicompressor")?;
    cmd.arg("expand")
        .arg("-m").arg(method)
        .arg("-i").arg(&cmp_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("expanded"));

    match (std::fs::read(&in_path),std::fs::read(&out_path)) {
        (Ok(v1),Ok(v2)) => {
            assert_eq!(v1,v2);
        },
        _ => panic!("unable to compare output with original")
    }
    Ok(())
}

#[test]
fn huffman_round_trip() -> STDRESULT {
    round_trip_test("huffman")
}

#[test]
fn lzss_round_trip() -> STDRESULT {
    round_trip_test("lzss")
}
