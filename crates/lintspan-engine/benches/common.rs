// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
use lintspan_engine::Issue;

#[allow(dead_code)]
pub fn generate_source(lines: usize) -> String {
    let base = "fn example(value: usize) -> usize {\n    let unused = value * 2;\n    value + 1\n}\n\n";
    base.repeat(lines)
}

/// One issue on every `unused` in `source`
#[allow(dead_code)]
pub fn issues_for(source: &str) -> Vec<Issue> {
    source
        .match_indices("unused")
        .map(|(at, word)| Issue::new(at..at + word.len(), "S1481", "Remove the unused local variable"))
        .collect()
}
