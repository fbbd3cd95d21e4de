use super::*;

#[test]
fn db_ping_parses() {
    let cli = Cli::try_parse_from(["gramtrack-cli", "db", "ping"]).expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn db_migrate_parses() {
    let cli =
        Cli::try_parse_from(["gramtrack-cli", "db", "migrate"]).expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn track_parses_with_defaults() {
    let cli = Cli::try_parse_from(["gramtrack-cli", "track", "alice"]).expect("valid args");
    let Some(Commands::Track {
        username,
        platform,
        tracking_id,
        user_id,
    }) = cli.command
    else {
        panic!("expected track command");
    };
    assert_eq!(username, "alice");
    assert_eq!(platform, "instagram");
    assert!(tracking_id.is_none());
    assert!(user_id.is_none());
}

#[test]
fn track_parses_session_flags() {
    let cli = Cli::try_parse_from([
        "gramtrack-cli",
        "track",
        "alice",
        "--platform",
        "twitter",
        "--tracking-id",
        "xyz",
        "--user-id",
        "user-1",
    ])
    .expect("valid args");
    let Some(Commands::Track {
        platform,
        tracking_id,
        user_id,
        ..
    }) = cli.command
    else {
        panic!("expected track command");
    };
    assert_eq!(platform, "twitter");
    assert_eq!(tracking_id.as_deref(), Some("xyz"));
    assert_eq!(user_id.as_deref(), Some("user-1"));
}

#[test]
fn cron_trigger_parses() {
    let cli = Cli::try_parse_from(["gramtrack-cli", "cron", "trigger"]).expect("valid args");
    assert!(matches!(
        cli.command,
        Some(Commands::Cron {
            command: CronCommands::Trigger
        })
    ));
}

#[test]
fn queue_status_parses() {
    let cli = Cli::try_parse_from(["gramtrack-cli", "queue", "status"]).expect("valid args");
    assert!(matches!(
        cli.command,
        Some(Commands::Queue {
            command: QueueCommands::Status
        })
    ));
}

#[test]
fn analytics_refresh_parses() {
    let cli = Cli::try_parse_from(["gramtrack-cli", "analytics", "refresh"]).expect("valid args");
    assert!(matches!(
        cli.command,
        Some(Commands::Analytics {
            command: AnalyticsCommands::Refresh
        })
    ));
}

#[test]
fn api_url_defaults_to_localhost() {
    let cli = Cli::try_parse_from(["gramtrack-cli", "queue", "status"]).expect("valid args");
    assert_eq!(cli.api_url, "http://localhost:3000");
}
