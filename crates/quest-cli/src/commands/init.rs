//! The `quest init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("quest.toml").exists() {
        println!("quest.toml already exists, skipping.");
    } else {
        std::fs::write("quest.toml", SAMPLE_CONFIG)?;
        println!("Created quest.toml");
    }

    std::fs::create_dir_all("question-sets")?;
    let example_path = std::path::Path::new("question-sets/example.qset");
    if example_path.exists() {
        println!("question-sets/example.qset already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_TEMPLATES)?;
        println!("Created question-sets/example.qset");
    }

    println!("\nNext steps:");
    println!("  1. Run: quest validate --templates question-sets/example.qset");
    println!("  2. Run: quest render --template question-sets/example.qset --index 1 --seed 42");
    println!("  3. Grade a submission: quest grade --instance <instance.json> --submission <answer.json>");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# quest configuration

parallelism = 4
output_dir = "./quest-results"

[grading]
negative_penalty = 0.5
sigfig_penalty = 0.25
multi_select_min_keys = 0
long_answer_min_chars = 10

[render]
max_attempts = 5
token_length = 8
label_length = 4

[evaluator]
max_expression_len = 1024
max_depth = 64
"#;

const EXAMPLE_TEMPLATES: &str = r#"[[type]]
mcq
[[question]]
What is {{ a }} times {{ b }}?
--
^ {{ a * b }}
& {{ a * b + 1 }}
& {{ a + b }}
% None of the above
[[variables]]
a: [2, 12, 1, int]
b: [2, 12, 1, int]
[[attribs]]
Name: Times table
Grade: 2
#----
[[type]]
numeric
[[question]]
A {{ m }} kg mass accelerates at {{ acc }} m/s^2. What force acts on it, in newtons? {[force]}
[[solution]]
F = m * a = {{ m * acc | 3 }} N.
[[grading]]
force: [m * acc, 0.02, rel]
[[variables]]
m: [1, 20, 0.5]
acc: [0.5, 9.5, 0.5]
[[attribs]]
Name: Newton's second law
Grade: 2
"#;
