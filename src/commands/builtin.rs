//! Default command set
//!
//! Registration order, which is also the tie-break order for overlapping
//! keywords:
//!
//! 1. `greeting` - hello, hi, hey, good morning, good evening
//! 2. `calculator` - calculator, calc
//! 3. `notepad` - editor, notepad, notes
//! 4. `explorer` - explorer, files, folder, file
//! 5. `firefox` - firefox, browser
//! 6. `chatgpt` - "chatgpt", or both "chat" and "gpt" anywhere in the text
//! 7. `time` - time, clock, how late
//! 8. `date` - date, today, what day
//! 9. `help` - help, what can you do, commands
//! 10. `cancel` - cancel, stop, never mind, forget it, thanks, thank you
//! 11. launch commands from `[[commands.launch]]`, in file order

use std::process::Command as Process;

use chrono::Local;
use tracing::{debug, info};

use super::{ActionError, Command, CommandCategory, CommandRegistry};
use crate::config::{Config, LaunchConfig};
use crate::error::Result;

/// Build the registry the assistant runs with
pub fn default_registry(config: &Config) -> Result<CommandRegistry> {
    let mut registry = CommandRegistry::new();
    register_defaults(&mut registry)?;
    register_launchers(&mut registry, &config.commands.launch)?;
    for name in registry.names() {
        if let Some(command) = registry.get(name) {
            debug!(name, keywords = ?command.keyword_list(), "command keywords");
        }
    }
    info!(count = registry.len(), order = ?registry.names(), "command registry ready");
    Ok(registry)
}

/// Register the built-in conversational commands
pub fn register_defaults(registry: &mut CommandRegistry) -> Result<()> {
    registry.register(
        Command::new("greeting", CommandCategory::Greeting, |_| {
            Ok("Hello! How can I help?".to_string())
        })
        .description("Greet the user")
        .keywords(["hello", "hi", "hey", "good morning", "good evening"]),
    )?;

    register_launchers(registry, &builtin_launchers())?;

    let chatgpt = chatgpt_launcher();
    registry.register(
        Command::new(chatgpt.name.clone(), CommandCategory::Web, {
            let launch = chatgpt.clone();
            move |_| spawn(&launch)
        })
        .description(chatgpt.description.clone())
        .keywords(chatgpt.keywords.iter().cloned())
        .matcher(|text| {
            let words: Vec<&str> = text.split(' ').collect();
            words.contains(&"chatgpt") || (text.contains("chat") && text.contains("gpt"))
        }),
    )?;

    registry.register(
        Command::new("time", CommandCategory::Utility, |_| {
            Ok(format!("It is {}.", Local::now().format("%H:%M")))
        })
        .description("Tell the current time")
        .keywords(["time", "clock", "how late"]),
    )?;

    registry.register(
        Command::new("date", CommandCategory::Utility, |_| {
            Ok(format!("Today is {}.", Local::now().format("%A, %-d %B %Y")))
        })
        .description("Tell the current date")
        .keywords(["date", "today", "what day"]),
    )?;

    registry.register(
        Command::new("help", CommandCategory::Help, |_| {
            Ok("I can tell the time and date, open programs and websites, and more. Just ask!"
                .to_string())
        })
        .description("Describe what the assistant can do")
        .keywords(["help", "what can you do", "commands"]),
    )?;

    registry.register(
        Command::new("cancel", CommandCategory::Control, |text| Ok(cancel_reply(text)))
            .description("Cancel or acknowledge")
            .keywords([
                "cancel",
                "stop",
                "never mind",
                "nevermind",
                "forget it",
                "thanks",
                "thank you",
            ]),
    )?;

    Ok(())
}

fn launcher(
    name: &str,
    description: &str,
    keywords: &[&str],
    program: &str,
    args: &[&str],
    web: bool,
    response: &str,
) -> LaunchConfig {
    LaunchConfig {
        name: name.to_string(),
        description: description.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        program: program.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
        web,
        response: Some(response.to_string()),
    }
}

fn builtin_launchers() -> Vec<LaunchConfig> {
    vec![
        launcher(
            "calculator",
            "Open the calculator",
            &["calculator", "calc"],
            "gnome-calculator",
            &[],
            false,
            "Opening the calculator.",
        ),
        launcher(
            "notepad",
            "Open a text editor",
            &["editor", "notepad", "notes"],
            "gnome-text-editor",
            &[],
            false,
            "Opening the editor.",
        ),
        launcher(
            "explorer",
            "Open the file manager",
            &["explorer", "files", "folder", "file"],
            "xdg-open",
            &["."],
            false,
            "Opening the file manager.",
        ),
        launcher(
            "firefox",
            "Open the web browser",
            &["firefox", "browser"],
            "firefox",
            &[],
            true,
            "Opening Firefox.",
        ),
    ]
}

fn chatgpt_launcher() -> LaunchConfig {
    launcher(
        "chatgpt",
        "Open ChatGPT in the browser",
        &["chatgpt", "chat gpt"],
        "xdg-open",
        &["https://chat.openai.com"],
        true,
        "Opening ChatGPT.",
    )
}

fn cancel_reply(text: &str) -> String {
    let words: Vec<&str> = text.split(' ').collect();
    if words.contains(&"thanks") || text.contains("thank you") {
        "You're welcome!".to_string()
    } else if words.contains(&"cancel") || words.contains(&"stop") {
        "Okay, cancelled.".to_string()
    } else {
        "Alright.".to_string()
    }
}

/// Register one command per configured program launcher
pub fn register_launchers(registry: &mut CommandRegistry, launchers: &[LaunchConfig]) -> Result<()> {
    for launch in launchers {
        let category = if launch.web {
            CommandCategory::Web
        } else {
            CommandCategory::System
        };
        let description = if launch.description.is_empty() {
            format!("Launch {}", launch.program)
        } else {
            launch.description.clone()
        };
        let launch_config = launch.clone();
        registry.register(
            Command::new(launch.name.clone(), category, move |_| spawn(&launch_config))
                .description(description)
                .keywords(launch.keywords.iter().cloned()),
        )?;
    }
    Ok(())
}

fn spawn(launch: &LaunchConfig) -> std::result::Result<String, ActionError> {
    let mut child = Process::new(&launch.program)
        .args(&launch.args)
        .spawn()
        .map_err(|e| ActionError::new(format!("failed to start {}: {}", launch.program, e)))?;

    let pid = child.id();
    info!(program = %launch.program, pid, "program launched");

    // Reap the child when it exits; the assistant never waits on it.
    std::thread::spawn(move || {
        let status = child.wait();
        debug!(pid, ?status, "launched program exited");
    });

    Ok(launch
        .response
        .clone()
        .unwrap_or_else(|| format!("Opening {}.", launch.name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Dispatch;

    fn defaults() -> CommandRegistry {
        default_registry(&Config::default()).unwrap()
    }

    fn matched(registry: &CommandRegistry, text: &str) -> Option<String> {
        registry.find_match(text).map(|c| c.name().to_string())
    }

    #[test]
    fn test_default_order() {
        assert_eq!(
            defaults().names(),
            vec![
                "greeting",
                "calculator",
                "notepad",
                "explorer",
                "firefox",
                "chatgpt",
                "time",
                "date",
                "help",
                "cancel"
            ]
        );
    }

    #[test]
    fn test_default_matches() {
        let registry = defaults();
        assert_eq!(matched(&registry, "what time is it").as_deref(), Some("time"));
        assert_eq!(matched(&registry, "what day is it").as_deref(), Some("date"));
        assert_eq!(matched(&registry, "Hello there").as_deref(), Some("greeting"));
        assert_eq!(matched(&registry, "what can you do").as_deref(), Some("help"));
        assert_eq!(matched(&registry, "never mind").as_deref(), Some("cancel"));
        assert_eq!(matched(&registry, "this is it"), None);
    }

    #[test]
    fn test_builtin_launchers_match() {
        let registry = defaults();
        assert_eq!(matched(&registry, "open the calculator").as_deref(), Some("calculator"));
        assert_eq!(matched(&registry, "take some notes").as_deref(), Some("notepad"));
        assert_eq!(matched(&registry, "show my files").as_deref(), Some("explorer"));
        assert_eq!(matched(&registry, "start the browser").as_deref(), Some("firefox"));
        assert_eq!(
            registry.get("firefox").map(|c| c.category()),
            Some(CommandCategory::Web)
        );
    }

    #[test]
    fn test_chatgpt_custom_matcher() {
        let registry = defaults();
        assert_eq!(matched(&registry, "open chatgpt").as_deref(), Some("chatgpt"));
        assert_eq!(matched(&registry, "chat with gpt").as_deref(), Some("chatgpt"));
        assert_eq!(matched(&registry, "Chat GPT please").as_deref(), Some("chatgpt"));
        // One half alone is not enough
        assert_eq!(matched(&registry, "let's chat"), None);
    }

    #[test]
    fn test_chatgpt_keeps_keywords_alongside_matcher() {
        let registry = defaults();
        let chatgpt = registry.get("chatgpt").unwrap();
        assert_eq!(chatgpt.keyword_list().to_vec(), vec!["chatgpt", "chat gpt"]);
        assert_eq!(registry.get("explorer").unwrap().keyword_list().len(), 4);
    }

    #[test]
    fn test_launchers_shadow_time_and_date() {
        // Launchers come before time, so "file" wins over "what day"
        assert_eq!(
            matched(&defaults(), "what day is on this file").as_deref(),
            Some("explorer")
        );
    }

    #[test]
    fn test_greeting_shadows_later_overlap() {
        // "hey" belongs to greeting, which is registered before help
        assert_eq!(
            matched(&defaults(), "hey what can you do").as_deref(),
            Some("greeting")
        );
    }

    #[test]
    fn test_time_response() {
        match defaults().dispatch("what time is it") {
            Dispatch::Executed { command, response } => {
                assert_eq!(command, "time");
                assert!(response.starts_with("It is "));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cancel_reply_is_contextual() {
        assert_eq!(cancel_reply("thank you"), "You're welcome!");
        assert_eq!(cancel_reply("thanks a lot"), "You're welcome!");
        assert_eq!(cancel_reply("stop"), "Okay, cancelled.");
        assert_eq!(cancel_reply("never mind"), "Alright.");
    }

    #[test]
    fn test_launcher_registered_after_defaults() {
        let mut config = Config::default();
        config.commands.launch.push(LaunchConfig {
            name: "editor".to_string(),
            description: String::new(),
            keywords: vec!["editor".to_string(), "notepad".to_string()],
            program: "true".to_string(),
            args: vec![],
            web: false,
            response: Some("Opening the editor.".to_string()),
        });
        let registry = default_registry(&config).unwrap();
        assert_eq!(registry.names().last().copied(), Some("editor"));
        let editor = registry.get("editor").unwrap();
        assert_eq!(editor.category(), CommandCategory::System);
        assert_eq!(editor.summary(), "Launch true");
    }

    #[test]
    fn test_launcher_name_clash_is_duplicate() {
        let mut config = Config::default();
        config.commands.launch.push(LaunchConfig {
            name: "time".to_string(),
            description: String::new(),
            keywords: vec!["clock".to_string()],
            program: "true".to_string(),
            args: vec![],
            web: false,
            response: None,
        });
        assert!(default_registry(&config).is_err());
    }

    #[test]
    fn test_missing_program_fails_gracefully() {
        let launch = LaunchConfig {
            name: "ghost".to_string(),
            description: String::new(),
            keywords: vec!["ghost".to_string()],
            program: "/nonexistent/wake-assistant-test-program".to_string(),
            args: vec![],
            web: false,
            response: None,
        };
        let mut registry = CommandRegistry::new();
        register_launchers(&mut registry, &[launch]).unwrap();
        assert!(matches!(
            registry.dispatch("ghost"),
            Dispatch::Failed { .. }
        ));
    }
}
