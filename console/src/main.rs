use search_console::command::{Command, HELP, format_timestamp};
use search_console::config::ConsoleConfig;
use search_console::notify::{Notification, NotificationLevel};
use search_console::query::{ImageSource, Modality, ModalityValue, QueryModalitySet, format_rgb};
use search_console::results::{ResultSet, ResultView};
use search_console::search::SearchOutcome;
use search_console::session::SessionState;
use search_console::{SearchConsole, vocabulary};
use shared::Frame;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

fn print_notification(notification: &Notification) {
    let marker = match notification.level {
        NotificationLevel::Info => "i",
        NotificationLevel::Success => "+",
        NotificationLevel::Failure => "!",
    };
    println!(
        "[{}] {} {}: {}",
        marker,
        notification.at.format("%H:%M:%S"),
        notification.title,
        notification.message
    );
}

fn print_frame(console: &SearchConsole, frame: &Frame) {
    let image = console
        .backend
        .frame_image_url(frame)
        .map(|url| url.to_string())
        .unwrap_or_default();
    println!(
        "    {} @ {}  score {:.3}  {}",
        frame.frame_id,
        format_timestamp(frame.timestamp),
        frame.score,
        image
    );
}

fn print_results(console: &SearchConsole, results: &ResultSet, view: ResultView) {
    if results.is_empty() {
        println!("No results");
        return;
    }
    match view {
        ResultView::Videos => {
            for group in &results.videos {
                println!("{} ({} frames)", group.video_id, group.frames.len());
                for frame in &group.frames {
                    print_frame(console, frame);
                }
            }
        }
        ResultView::Frames => {
            for frame in &results.frames {
                print!("{} ", frame.video_id);
                print_frame(console, frame);
            }
        }
    }
}

fn print_status(console: &SearchConsole, modalities: &QueryModalitySet) {
    for modality in Modality::ALL {
        let value = match modality {
            Modality::Text => modalities.text().to_string(),
            Modality::Color => modalities.color().map(|c| format_rgb(&c)).unwrap_or_default(),
            Modality::Image => match modalities.image() {
                Some(ImageSource::File(path)) => path.display().to_string(),
                Some(ImageSource::Bytes(bytes)) => format!("{} bytes", bytes.len()),
                None => String::new(),
            },
            Modality::Objects => modalities.objects().join(", "),
            Modality::Words => modalities.words().join(" "),
        };
        let flag = if modalities.is_enabled(modality) { "on " } else { "off" };
        println!("{:<8} {} {}", modality.to_string(), flag, value);
    }
    println!("search   {}", if console.search.is_busy() { "running" } else { "idle" });
    match console.session.state() {
        SessionState::LoggedOut => println!("dres     logged out"),
        SessionState::LoggingIn => println!("dres     logging in"),
        SessionState::LoggedIn {
            session,
            pending_submissions,
        } => println!(
            "dres     evaluation {} ({} pending)",
            session.evaluation_id, pending_submissions
        ),
    }
}

fn spawn_search(console: &SearchConsole, modalities: QueryModalitySet, view: ResultView) {
    let console = console.clone();
    tokio::spawn(async move {
        match console.search.search(&modalities).await {
            Ok(SearchOutcome::Completed(results)) => print_results(&console, &results, view),
            Ok(SearchOutcome::Dropped) => println!("A search is already running"),
            // Rejections and failures are already notified.
            Err(e) => log::debug!("Search ended with error: {}", e),
        }
    });
}

/// Returns `false` once the console should exit.
async fn handle(
    console: &SearchConsole,
    modalities: &mut QueryModalitySet,
    view: &mut ResultView,
    command: Command,
) -> bool {
    let updated = match command {
        Command::Text(text) => modalities.set_modality(true, ModalityValue::Text(text)),
        Command::Color(color) => modalities.set_modality(true, ModalityValue::Color(Some(color))),
        Command::Image(path) => {
            let enabled = path.is_some();
            modalities.set_modality(enabled, ModalityValue::Image(path.map(ImageSource::File)))
        }
        Command::Objects(labels) => modalities.set_modality(true, ModalityValue::Objects(labels)),
        Command::ToggleObject(label) => modalities.toggle_object(&label),
        Command::Words(words) => modalities.set_modality(true, ModalityValue::Words(words)),
        Command::SetEnabled(modality, enabled) => {
            modalities.set_enabled(modality, enabled);
            Ok(())
        }
        Command::Suggest(search) => {
            println!("{}", vocabulary::suggest(&search, modalities.objects()).join(", "));
            Ok(())
        }
        Command::Search => {
            spawn_search(console, modalities.clone(), *view);
            Ok(())
        }
        Command::View(next) => {
            *view = next;
            print_results(console, &console.results.snapshot(), next);
            Ok(())
        }
        Command::Explore(video_id) => {
            if let Ok(url) = console.backend.video_url(&video_id) {
                println!("{}", url);
            }
            if let Ok(frames) = console.search.explore(&video_id).await {
                for frame in &frames {
                    print_frame(console, frame);
                }
            }
            Ok(())
        }
        Command::Submit {
            video_id,
            timestamp,
        } => {
            println!("Submitting {} at {}", video_id, format_timestamp(timestamp));
            let session = console.session.clone();
            tokio::spawn(async move {
                if let Err(e) = session.submit(&video_id, timestamp).await {
                    log::debug!("Submission ended with error: {}", e);
                }
            });
            Ok(())
        }
        Command::ShowSettings => {
            match serde_yaml::to_string(&console.settings.get()) {
                Ok(yaml) => print!("{}", yaml),
                Err(e) => log::error!("Failed to render settings: {}", e),
            }
            Ok(())
        }
        Command::UpdateSetting(update) => {
            let next = update.apply(&console.settings.get());
            if let Err(e) = console.settings.set(next) {
                println!("{}", e);
            }
            Ok(())
        }
        Command::Reset => {
            modalities.reset();
            console.results.clear();
            Ok(())
        }
        Command::Status => {
            print_status(console, modalities);
            Ok(())
        }
        Command::Help => {
            println!("{}", HELP);
            Ok(())
        }
        Command::Quit => return false,
    };
    if let Err(e) = updated {
        println!("{}", e);
    }
    true
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    let config = match ConsoleConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let console = match SearchConsole::from_config(&config) {
        Ok(console) => console,
        Err(e) => {
            log::error!("Failed to start console: {}", e);
            return ExitCode::FAILURE;
        }
    };
    log::info!("Retrieval backend at {}", config.backend_url);

    let mut notifications = console.notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => print_notification(&notification),
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("Missed {} notifications", missed)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    console.session.spawn_login();

    let mut modalities = QueryModalitySet::new();
    let mut view = ResultView::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type `help` for commands");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed to read input: {}", e);
                return ExitCode::FAILURE;
            }
        };
        match Command::parse(&line) {
            Ok(Some(command)) => {
                if !handle(&console, &mut modalities, &mut view, command).await {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => println!("{}", e),
        }
    }
    ExitCode::SUCCESS
}
