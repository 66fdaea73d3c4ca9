use anyhow::{Context, Result};
use pgoutbox_bus::NatsPublisher;
use pgoutbox_pg::replication::ensure_slot_available;
use pgoutbox_pg::{
    connect_postgres, Dispatcher, FeedHandle, FeedSpec, Lsn, ReplicationSession, SessionConfig,
};
use tracing::info;

use super::shutdown_signal;
use crate::config::ProjectConfig;

pub async fn cmd_cdc(config: ProjectConfig, slot: Option<String>, persistent_slot: bool) -> Result<()> {
    info!("Starting pgoutbox CDC relay");

    let mut spec = config.feed_spec();
    if let Some(slot) = slot {
        spec.slot = slot;
    }
    if persistent_slot {
        spec.temporary = false;
    }

    let conn_str = config.postgres_connection_string()?;
    let session_config =
        SessionConfig::from_connection_string(&conn_str).context("Invalid Postgres connection string")?;

    if !spec.temporary {
        check_slot_free(&conn_str, &spec).await?;
    }

    let publisher = NatsPublisher::connect(&config.nats_url()?, config.publish_timeout())
        .await
        .context("Failed to connect to NATS")?;

    let mut session = ReplicationSession::connect(&session_config)
        .await
        .context("Failed to open replication connection")?;

    let identity = session.identify_system().await?;
    info!(
        system_id = %identity.system_id,
        timeline = identity.timeline,
        lsn = %identity.xlogpos,
        "Identified system"
    );

    let handle = session
        .provision_feed(&spec)
        .await
        .context("Failed to provision replication feed")?;

    let start = start_position(config.start_lsn()?, &handle, identity.xlogpos);
    session
        .start_streaming(&handle, start, &config.stream_options())
        .await
        .context("Failed to start replication")?;

    let closer = session.closer();
    tokio::spawn(async move {
        shutdown_signal().await;
        closer.close();
    });

    let mut dispatcher = Dispatcher::new(publisher, config.dispatch_config(), start);
    let reason = dispatcher
        .run(&mut session)
        .await
        .context("Replication stream failed")?;

    info!(
        reason = ?reason,
        slot = %handle.slot,
        lsn = %dispatcher.position(),
        published = dispatcher.stats().rows_published,
        "CDC relay stopped"
    );
    Ok(())
}

/// A persistent slot may still be held by another consumer; fail fast with its pid.
async fn check_slot_free(conn_str: &str, spec: &FeedSpec) -> Result<()> {
    let client = connect_postgres(conn_str)
        .await
        .context("Failed to connect to Postgres")?;
    ensure_slot_available(&client, &spec.slot).await?;
    Ok(())
}

/// Where `START_REPLICATION` begins.
///
/// An explicit position wins. A reused slot resumes from its confirmed
/// position (requested as `0/0`); a fresh slot starts at the server's
/// current WAL position.
fn start_position(configured: Option<Lsn>, handle: &FeedHandle, server_position: Lsn) -> Lsn {
    match configured {
        Some(lsn) => lsn,
        None if handle.slot_reused => Lsn::ZERO,
        None => server_position,
    }
}
