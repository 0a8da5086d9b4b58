use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::tempdir;

const HEADER: &str = "participant_id\tvcf_path\tdna_allcount_path\trna_allcount_path\n";

fn write_participant(dir: &Path, id: &str) -> String {
    let vcf = dir.join(format!("{id}.vcf"));
    let dna = dir.join(format!("{id}.dna.allcount"));
    let rna = dir.join(format!("{id}.rna.allcount"));
    fs::write(
        &vcf,
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\ts\n\
         chr3\t1234\t.\tG\tA\t80\tPASS\tAN=2;AC=1;CIGAR=1X;DP=31;AF=0.5;AB=0.52;ODDS=44.1\tGT\t0/1\n",
    )
    .expect("write vcf");
    let coverage = "CountReadsCovering v1.1 cli\nNumberOfMappedReads\t10\nNumberOfContigs\t1\n\
                    3\t198295559\n>3\nx4d1\n1f\n**done**\n";
    fs::write(&dna, coverage).expect("write dna");
    fs::write(&rna, coverage).expect("write rna");
    format!("{id}\t{}\t{}\t{}\n", vcf.display(), dna.display(), rna.display())
}

#[test]
fn cli_processes_registered_participants_and_skips_unknown_ones() {
    let tmp = tempdir().expect("temporary directory");
    let registry = tmp.path().join("registry.tsv");
    let mut table = String::from(HEADER);
    table.push_str(&write_participant(tmp.path(), "p1"));
    table.push_str(&write_participant(tmp.path(), "p2"));
    fs::write(&registry, table).expect("write registry");

    let exe = env!("CARGO_BIN_EXE_select-germline");
    let output = Command::new(exe)
        .args(["--registry", registry.to_str().expect("path str"), "--threads", "2"])
        .args(["p1", "p2", "nobody"])
        .env("RUST_LOG", "warn")
        .output()
        .expect("run select-germline");

    assert!(output.status.success(), "CLI exited with status {:?}", output.status);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nobody"), "missing skip warning: {stderr}");
    assert!(stderr.contains("2 succeeded, 0 failed, 1 skipped"), "{stderr}");

    for id in ["p1", "p2"] {
        let written = fs::read_to_string(tmp.path().join(format!("{id}.selectedVariants")))
            .expect("output file");
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("SelectGermlineVariants v"));
        assert!(lines[1].starts_with("chr3\t1234\tchr3\t1234\t"));
        assert_eq!(lines[2], "**done**");
    }
}

#[test]
fn cli_fails_without_a_readable_registry() {
    let tmp = tempdir().expect("temporary directory");
    let status = Command::new(env!("CARGO_BIN_EXE_select-germline"))
        .args(["--registry", tmp.path().join("absent.tsv").to_str().expect("path str"), "p1"])
        .status()
        .expect("run select-germline");
    assert_eq!(status.code(), Some(1));
}

#[test]
fn cli_fails_when_no_participant_can_run() {
    let tmp = tempdir().expect("temporary directory");
    let registry = tmp.path().join("registry.tsv");
    fs::write(&registry, HEADER).expect("write registry");
    let status = Command::new(env!("CARGO_BIN_EXE_select-germline"))
        .args(["--registry", registry.to_str().expect("path str"), "ghost"])
        .status()
        .expect("run select-germline");
    assert_eq!(status.code(), Some(1));
}
