use gemma3n_automation::CycleOutcome;
use gemma3n_core::MediaKind;
use std::path::PathBuf;

const RULE: &str = "============================================================";
const THIN_RULE: &str = "------------------------------------------------------------";

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn modes(files: &[(MediaKind, PathBuf)]) -> String {
    let names: Vec<&str> = files.iter().map(|(kind, _)| kind.as_str()).collect();
    format!("[{}]", names.join(", "))
}

fn file_list(files: &[(MediaKind, PathBuf)]) -> String {
    let names: Vec<String> = files.iter().map(|(_, path)| path.display().to_string()).collect();
    format!("[{}]", names.join(", "))
}

/// Prints a caption/detect result.
pub fn task_banner(task: &str, event: Option<&str>, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Dispatched { files, reply, .. } => {
            println!("\n[{}] Task: {}", timestamp(), task.to_uppercase());
            println!("{}", RULE);
            println!("Modes: {}", modes(files));
            println!("Files: {}", file_list(files));
            if let Some(event) = event {
                println!("Event: {}", event);
            }
            println!("{}", THIN_RULE);
            println!("{}", reply);
            println!("{}", RULE);
        }
        CycleOutcome::Skipped { reason } => {
            eprintln!("[{}] {} skipped: {}", timestamp(), task, reason)
        }
        CycleOutcome::Failed { error, .. } => {
            eprintln!("[{}] {} failed: {}", timestamp(), task, error)
        }
    }
}

/// Prints a dynamic-prompting result.
pub fn dynamic_banner(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Dispatched {
            config,
            files,
            reply,
            config_changed,
        } => {
            let status = if *config_changed { "NEW CONFIG" } else { "SCHEDULED RUN" };
            println!("\n[{}] Dynamic Prompt Result ({}):", timestamp(), status);
            println!("{}", RULE);
            println!("System: {}", config.system_prompt);
            println!("User: {}", config.user_prompt);
            println!("Modes: {}", modes(files));
            println!("Files: {}", file_list(files));
            println!("{}", THIN_RULE);
            println!("{}", reply);
            println!("{}", RULE);
        }
        CycleOutcome::Skipped { reason } => {
            eprintln!("[{}] dynamic prompt skipped: {}", timestamp(), reason)
        }
        CycleOutcome::Failed { error, .. } => {
            eprintln!("[{}] dynamic prompt failed: {}", timestamp(), error)
        }
    }
}
