//! Console front end for the mood dialogue.
//!
//! Reads one message per line from stdin and prints the bot's reply.
//! Slash commands: `/status`, `/end`, `/new`, `/quit`.

use std::error::Error;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use mood_dialogue::adapters::{
    HttpCollaboratorConfig, HttpMoodDetector, HttpRecommender, InMemorySessionStore,
    LexiconMoodDetector, PostgresSessionStore, StaticRecommender,
};
use mood_dialogue::application::{
    ConversationManager, ExpirySweeper, ExpirySweeperConfig, TurnRequest, TurnResponse,
};
use mood_dialogue::config::{AppConfig, CollaboratorsConfig, DatabaseConfig};
use mood_dialogue::domain::conversation::EndReason;
use mood_dialogue::domain::foundation::SessionId;
use mood_dialogue::domain::probing::ProbeQuestionBank;
use mood_dialogue::ports::{MoodDetector, Recommender, SessionStore};
use mood_dialogue::telemetry::init_tracing;

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config.logging)?;

    let store = build_store(config.database.as_ref()).await?;
    let (detector, recommender) = build_collaborators(&config.collaborators)?;
    let bank = match &config.dialogue.question_bank_path {
        Some(path) => ProbeQuestionBank::from_path(path)?,
        None => ProbeQuestionBank::with_defaults()?,
    };

    let manager = ConversationManager::from_config(
        &config,
        Arc::clone(&store),
        detector,
        recommender,
        Arc::new(bank),
    );
    manager.load_question_stats().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::with_config(
        Arc::clone(&store),
        manager.locks(),
        ExpirySweeperConfig::from_session_config(&config.session),
    );
    let sweeper_handle = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    let result = repl(&manager).await;

    let _ = shutdown_tx.send(true);
    if let Err(error) = sweeper_handle.await {
        tracing::warn!(%error, "expiry sweeper task failed");
    }
    result
}

async fn build_store(database: Option<&DatabaseConfig>) -> Result<Arc<dyn SessionStore>, BoxError> {
    let Some(database) = database else {
        tracing::info!("using in-memory session store");
        return Ok(Arc::new(InMemorySessionStore::new()));
    };

    let pool = database
        .pool_options()
        .connect(database.connection_url())
        .await?;
    let store = PostgresSessionStore::new(pool);
    if database.run_migrations {
        store.migrate().await?;
    }
    tracing::info!(max_connections = database.max_connections, "using postgres session store");
    Ok(Arc::new(store))
}

fn build_collaborators(
    config: &CollaboratorsConfig,
) -> Result<(Arc<dyn MoodDetector>, Arc<dyn Recommender>), BoxError> {
    let http_config = |url: &str| {
        let mut http = HttpCollaboratorConfig::new(url).with_timeout(config.timeout());
        if let Some(key) = &config.api_key {
            http = http.with_api_key(key.clone());
        }
        http
    };

    let detector: Arc<dyn MoodDetector> = match &config.mood_url {
        Some(url) => Arc::new(HttpMoodDetector::new(http_config(url))?),
        None => Arc::new(LexiconMoodDetector::new()),
    };
    let recommender: Arc<dyn Recommender> = match &config.recommender_url {
        Some(url) => Arc::new(
            HttpRecommender::new(http_config(url))?.with_limit(config.recommendation_limit),
        ),
        None => Arc::new(StaticRecommender::new(config.recommendation_limit)),
    };
    Ok((detector, recommender))
}

async fn repl(manager: &ConversationManager) -> Result<(), BoxError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut session: Option<SessionId> = None;

    println!("Tell me how you feel. Commands: /status /end /new /quit");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/new" => {
                session = None;
                println!("(starting over)");
            }
            "/status" => match session {
                Some(id) => match manager.session_status(id).await {
                    Ok(status) => println!("{}", serde_json::to_string_pretty(&status)?),
                    Err(error) => println!("(error: {})", error),
                },
                None => println!("(no session yet)"),
            },
            "/end" => {
                if let Some(id) = session.take() {
                    match manager.end_session(id, EndReason::EndedByClient).await {
                        Ok(_) => println!("(session ended)"),
                        Err(error) => println!("(error: {})", error),
                    }
                }
            }
            message => {
                let mut request = TurnRequest::new(message);
                if let Some(id) = session {
                    request = request.in_session(id);
                }
                match manager.process_turn(request).await {
                    Ok(response) => {
                        print_reply(&response);
                        session = (!response.session_ended).then_some(response.session_id);
                    }
                    Err(error) if error.is_retryable() => {
                        println!("(busy, please try again: {})", error)
                    }
                    Err(error) => println!("(error: {})", error),
                }
            }
        }
    }
    Ok(())
}

fn print_reply(response: &TurnResponse) {
    println!("bot> {}", response.bot_response);
    for (rank, song) in response.recommendations.iter().enumerate() {
        println!("  {}. {} - {}", rank + 1, song.title, song.artist);
    }
    tracing::debug!(
        session_id = %response.session_id,
        turn_number = response.turn_number,
        state = %response.current_state,
        clarity = response.clarity_score,
        "reply printed"
    );
}
