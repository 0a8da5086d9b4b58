// Source policy for the crate's own Rust files, checked on every build.
//
// Each rule is a line regex run through `grep`'s searcher plus a filter on the
// matched line. Any hit fails the build with a file:line listing.

use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::process;
use walkdir::WalkDir;

// Directories holding the crate's own sources. Build output and reference
// material elsewhere in the checkout are left alone.
const SOURCE_DIRS: [&str; 5] = ["select", "shared", "src", "tests", "benches"];

const CHANGELOG_WORDS: &str =
    "FIXED|CORRECTED|FIXES|FIX|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE";

#[derive(Debug, Clone, Copy)]
enum Rule {
    UnderscorePrefix,
    ChangelogComment,
    DoubleStarComment,
    ShoutingComment,
    AllowDeadCode,
}

const RULES: [Rule; 5] = [
    Rule::UnderscorePrefix,
    Rule::ChangelogComment,
    Rule::DoubleStarComment,
    Rule::ShoutingComment,
    Rule::AllowDeadCode,
];

impl Rule {
    fn pattern(self) -> String {
        match self {
            Self::UnderscorePrefix => r"\b_[a-zA-Z0-9_]+\b".to_string(),
            Self::ChangelogComment => format!(r"(//|/\*).*(?:{CHANGELOG_WORDS})"),
            Self::DoubleStarComment => r"(//|/\*).*\*\*".to_string(),
            Self::ShoutingComment => r"(//|/\*).*".to_string(),
            Self::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::UnderscorePrefix => "underscore-prefixed name; use it or remove it",
            Self::ChangelogComment => "changelog word in a comment",
            Self::DoubleStarComment => "'**' in a non-doc comment",
            Self::ShoutingComment => "comment written entirely in capitals",
            Self::AllowDeadCode => "#[allow(dead_code)]; use the item or remove it",
        }
    }

    /// The build script is only held to the naming rule.
    fn covers_build_script(self) -> bool {
        matches!(self, Self::UnderscorePrefix)
    }

    /// Whether a line the pattern matched really breaks the rule.
    fn flags(self, line: &str) -> bool {
        match self {
            Self::UnderscorePrefix => !is_comment(line) && !underscore_in_string(line),
            Self::ChangelogComment | Self::AllowDeadCode => true,
            Self::DoubleStarComment => !is_doc_comment(line),
            Self::ShoutingComment => comment_text(line).is_some_and(is_shouting),
        }
    }
}

struct RuleSink {
    rule: Rule,
    hits: Vec<String>,
}

impl Sink for RuleSink {
    type Error = io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch<'_>) -> Result<bool, io::Error> {
        let line = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.rule.flags(line) {
            self.hits
                .push(format!("{}:{line}", mat.line_number().unwrap_or(0)));
        }
        Ok(true)
    }
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//") || line.contains("/*")
}

fn is_doc_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("///") || trimmed.starts_with("//!")
}

fn underscore_in_string(line: &str) -> bool {
    line.split('"').skip(1).step_by(2).any(|quoted| quoted.contains('_'))
}

/// The text of a whole-line `//` comment or of the first `/* */` block.
fn comment_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(rest.trim_start_matches(['/', '!']).trim());
    }
    let start = line.find("/*")? + 2;
    let body = &line[start..];
    Some(body.find("*/").map_or(body, |end| &body[..end]).trim())
}

fn is_shouting(text: &str) -> bool {
    let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(char::is_uppercase)
}

fn rust_sources() -> Vec<PathBuf> {
    SOURCE_DIRS
        .iter()
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(Result::ok))
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|entry| entry.into_path())
        .collect()
}

/// Runs every rule over every source and returns the hits, one per line.
fn check_sources() -> Result<Vec<String>, Box<dyn Error>> {
    let sources = rust_sources();
    let build_script = [PathBuf::from("build.rs")];
    let mut searcher = Searcher::new();
    let mut report = Vec::new();

    for rule in RULES {
        let matcher = RegexMatcher::new_line_matcher(&rule.pattern())?;
        let extra: &[PathBuf] = if rule.covers_build_script() {
            &build_script
        } else {
            &[]
        };
        for path in sources.iter().chain(extra) {
            let mut sink = RuleSink {
                rule,
                hits: Vec::new(),
            };
            searcher.search_path(&matcher, path, &mut sink)?;
            report.extend(
                sink.hits
                    .into_iter()
                    .map(|hit| format!("{}:{hit}  ({})", path.display(), rule.description())),
            );
        }
    }
    Ok(report)
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    match check_sources() {
        Ok(report) if report.is_empty() => {}
        Ok(report) => {
            eprintln!("\nsource policy violations:");
            for line in &report {
                eprintln!("  {line}");
            }
            process::exit(1);
        }
        Err(e) => {
            eprintln!("source policy check failed: {e}");
            process::exit(1);
        }
    }
}
