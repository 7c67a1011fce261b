use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use object_tracker::config::TrackerConfig;
use object_tracker::io::load_percept_log;
use object_tracker::model::UpdateKind;
use object_tracker::perception::TransformTree;
use object_tracker::query::ObjectQuery;
use object_tracker::system::{ObjectTracker, Publication, replay_log};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(config_path), Some(log_path)) = (args.next(), args.next()) else {
        bail!("usage: object-tracker <config.yaml> <percepts.csv>");
    };

    let config = TrackerConfig::load(&config_path)?;
    let ageing_interval_ns = (config.ageing_interval_s * 1e9) as u64;

    let records = load_percept_log(&log_path)?;
    println!("Loaded {} records from {}", records.len(), log_path);

    // Transform rows in the log feed this tree while percepts resolve against it.
    let transforms = Arc::new(TransformTree::from_config(
        &config.static_transforms,
        config.transform_tolerance_ns(),
    ));
    // No scheduler thread: replay ages on log time so results depend only on the log.
    let mut tracker = ObjectTracker::builder(config)
        .transforms(transforms.clone())
        .build();
    let publications = tracker.subscribe();

    let stats = replay_log(&tracker, &transforms, records, ageing_interval_ns);
    tracker.publish_model();
    tracker.shutdown();
    info!(
        "Replayed {} percepts, {} transforms, {} commands ({} ageing passes)",
        stats.percepts, stats.transforms, stats.commands, stats.ageing_passes
    );

    let mut created = 0;
    let mut removed = 0;
    for publication in publications.try_iter() {
        if let Publication::Update(update) = publication {
            match update.kind {
                UpdateKind::Created => created += 1,
                UpdateKind::Removed => removed += 1,
                _ => {}
            }
        }
    }

    let snapshot = tracker.get_object_model();
    let confirmed = ObjectQuery::confirmed().select(&snapshot);
    println!(
        "{} objects created, {} removed, {} remaining, {} confirmed",
        created,
        removed,
        snapshot.len(),
        confirmed.len()
    );
    for object in &confirmed {
        println!(
            "  #{:<3} {:<20} {:<10} [{:8.2}, {:8.2}] {}",
            object.number,
            object.id,
            object.class_id,
            object.position.x,
            object.position.y,
            object.name.as_deref().unwrap_or("")
        );
    }

    Ok(())
}
