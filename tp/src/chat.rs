//! Interactive planning session and terminal rendering

use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::{mpsc, watch};

use crate::domain::{PlanResponse, TaskList, TripInfo, TurnRequest};
use crate::orchestrator::{Orchestrator, ProgressEvent, RoundReport, TaskStatus};

/// Multi-turn planning over stdin/stdout
pub struct ChatSession {
    orchestrator: Orchestrator,
    context_id: Option<String>,
}

enum SlashResult {
    Continue,
    Quit,
}

impl ChatSession {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            context_id: None,
        }
    }

    /// Run the chat loop until EOF or /quit
    pub async fn run(&mut self, initial_query: Option<String>) -> Result<()> {
        self.print_welcome();

        if let Some(query) = initial_query {
            println!("{} {}", ">".bright_green(), query);
            self.process_user_input(&query).await?;
        }

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            match rl.readline(&format!("{} ", ">".bright_green())) {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(input);

                    if input.starts_with('/') {
                        match self.handle_slash_command(input).await {
                            SlashResult::Continue => continue,
                            SlashResult::Quit => break,
                        }
                    } else {
                        self.process_user_input(input).await?;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        println!("Safe travels!");
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "Trip Planner".bright_cyan().bold());
        println!("Tell me about the trip you have in mind.");
        println!("Type {} for help, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();
    }

    async fn handle_slash_command(&mut self, input: &str) -> SlashResult {
        let cmd = input.split_whitespace().next().unwrap_or("");
        match cmd {
            "/help" | "/h" => {
                println!();
                println!("{}", "Available Commands:".bright_cyan());
                println!("  {:10} Show this help", "/help".yellow());
                println!("  {:10} Exit", "/quit".yellow());
                println!("  {:10} Forget this trip and start a new session", "/new".yellow());
                println!("  {:10} Show what the planner knows so far", "/trip".yellow());
                println!();
                SlashResult::Continue
            }
            "/quit" | "/q" | "/exit" => SlashResult::Quit,
            "/new" => {
                self.context_id = None;
                println!("{}", "Started a new session.".dimmed());
                SlashResult::Continue
            }
            "/trip" => {
                self.print_trip().await;
                SlashResult::Continue
            }
            _ => {
                println!("{} Unknown command: {}", "?".yellow(), cmd);
                println!("Type {} for available commands", "/help".yellow());
                SlashResult::Continue
            }
        }
    }

    async fn print_trip(&self) {
        let Some(id) = &self.context_id else {
            println!("{}", "No trip yet.".dimmed());
            return;
        };
        match self.orchestrator.service().session(id).await {
            Ok(Some(state)) => {
                println!("{} {} (round {}, {})", "Session".dimmed(), id, state.round, state.machine);
                print_trip_info(&state.trip_info);
            }
            Ok(None) => println!("{}", "Session expired.".dimmed()),
            Err(e) => println!("{} {}", "Could not read session:".red(), e),
        }
    }

    async fn process_user_input(&mut self, input: &str) -> Result<()> {
        let request = match &self.context_id {
            Some(id) => TurnRequest::with_context(input, id.clone()),
            None => TurnRequest::new(input),
        };

        let (progress_tx, mut progress_rx) = mpsc::channel(64);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let printer = tokio::spawn(async move {
            while let Some(event) = progress_rx.recv().await {
                print_event(&event);
            }
        });

        let reply = self.orchestrator.handle_turn(request, progress_tx, cancel_rx).await?;
        let _ = printer.await;

        if let Some(id) = reply.response.context_id() {
            self.context_id = Some(id.to_string());
        }
        print_response(&reply.response);
        if let Some(report) = &reply.report {
            print_report(report);
        }
        Ok(())
    }
}

/// Print a planner response
pub fn print_response(response: &PlanResponse) {
    match response {
        PlanResponse::InputRequired { question, .. } => {
            println!("{} {}", "?".bright_yellow(), question);
        }
        PlanResponse::Completed { data, .. } => print_task_list(data),
        PlanResponse::Error { message, .. } => {
            println!("{} {}", "!".red(), message);
        }
    }
}

fn print_trip_info(trip: &TripInfo) {
    let fields = [
        ("From", trip.origin.clone()),
        ("To", trip.destination.clone()),
        ("Depart", trip.depart_date.map(|d| d.to_string())),
        ("Return", trip.return_date.map(|d| d.to_string())),
        ("Travelers", trip.travelers.map(|n| n.to_string())),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("  {:10} {}", label.dimmed(), value);
        }
    }
}

/// Print a completed TaskList
pub fn print_task_list(list: &TaskList) {
    println!("{}", "Trip planned".bright_green().bold());
    print_trip_info(&list.trip_info);
    println!();
    for task in &list.tasks {
        println!(
            "  {} [p{}] {} {}",
            task.id.bright_cyan(),
            task.priority(),
            task.description,
            format!("({} min)", task.metadata.estimated_minutes).dimmed()
        );
    }
    println!();
    println!("{}", list.reasoning.dimmed());
    println!("Estimated time: {} min", list.estimated_minutes);
}

/// Print one progress event as it arrives
pub fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::RoundStarted { task_count, wave_count } => {
            println!("{} dispatching {} tasks in {} waves", "»".bright_cyan(), task_count, wave_count);
        }
        ProgressEvent::WaveStarted { wave, task_ids } => {
            println!("  {} wave {}: {}", "»".dimmed(), wave + 1, task_ids.join(", "));
        }
        ProgressEvent::TaskDispatched { task_id, capability } => {
            println!("    {} {} -> {}", "→".dimmed(), task_id, capability);
        }
        ProgressEvent::TaskSucceeded { task_id, agent, summary } => {
            println!("    {} {} ({}): {}", "✓".green(), task_id, agent, summary);
        }
        ProgressEvent::TaskFailed { task_id, reason } => {
            println!("    {} {}: {}", "✗".red(), task_id, reason);
        }
        ProgressEvent::TaskSkipped { task_id, reason } => {
            println!("    {} {}: {}", "-".yellow(), task_id, reason);
        }
        ProgressEvent::RoundFinished { .. } => {}
    }
}

/// Print the aggregated round result
pub fn print_report(report: &RoundReport) {
    println!();
    println!(
        "{} {} succeeded, {} failed, {} skipped{}",
        "Round:".bold(),
        report.succeeded().len(),
        report.failed().len(),
        report.skipped().len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    for outcome in &report.outcomes {
        let status = match outcome.status {
            TaskStatus::Succeeded => outcome.status.to_string().green(),
            TaskStatus::Failed => outcome.status.to_string().red(),
            TaskStatus::Skipped => outcome.status.to_string().yellow(),
        };
        println!("  {:24} {:10} {}", outcome.task_id, status, outcome.detail);
    }
}
