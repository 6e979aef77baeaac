use crate::error::{ErrorKind, Result};
use crate::{Command, ListArgs, SortArg, Target};
use exn::ResultExt;
use serde::Serialize;
use std::io::{Write, stdout};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use veil_config::Config;
use veil_engine::Engine;
use veil_query::{
    Catalog, CommonFilter, Direction, FindOptions, GalleryFilter, GroupFilter, ImageFilter, Listing,
    PerformerFilter, SceneFilter, SortField, StudioFilter, TagFilter,
};
use veil_query::{Gallery, Group, Image, Performer, Scene, Studio, Tag};
use veil_store::{Database, DeferredRepository, EntityType, ExclusionRepository, PoolSettings, UserId};
use veil_trigger::{Dispatcher, Outcome, Trigger, WorkerSettings};

struct Services {
    db: Database,
    engine: Engine,
    dispatcher: Dispatcher,
    settings: WorkerSettings,
}

impl Services {
    async fn open(config: &Config) -> Result<Self> {
        let path = &config.database.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Database)?;
        }
        let settings =
            PoolSettings { max_connections: config.database.max_connections, busy_timeout: config.database.busy_timeout() };
        let db = Database::connect_with(path, settings).await.or_raise(|| ErrorKind::Database)?;
        info!(path = %path.display(), "database opened");
        let engine = Engine::from(&db).with_concurrency(config.engine.concurrency);
        let dispatcher = Dispatcher::new(engine.clone());
        let settings = WorkerSettings {
            max_attempts: config.deferred.max_attempts,
            sweep_interval: config.deferred.sweep_interval(),
        };
        Ok(Self { db, engine, dispatcher, settings })
    }

    fn worker(&self) -> veil_trigger::Worker {
        self.dispatcher.worker(DeferredRepository::from(&self.db), self.settings)
    }
}

pub(crate) async fn run(command: Command, config: &Config) -> Result<()> {
    let services = Services::open(config).await?;
    let result = execute(command, &services).await;
    services.db.close().await;
    result
}

async fn execute(command: Command, services: &Services) -> Result<()> {
    match command {
        Command::Recompute { user: Some(user_id), .. } => {
            let recomputed =
                services.engine.recompute_for_user(user_id).await.or_raise(|| ErrorKind::Command("recompute"))?;
            print_json(&recomputed.rows)
        },
        Command::Recompute { user: None, .. } => {
            let report = services.engine.recompute_all_users().await.or_raise(|| ErrorKind::Command("recompute"))?;
            for (user_id, err) in &report.failed {
                warn!(user_id, error = ?err, "recompute failed");
            }
            let succeeded: Vec<UserId> = report.succeeded.iter().map(|r| r.user_id).collect();
            let failed: Vec<UserId> = report.failed.iter().map(|(user_id, _)| *user_id).collect();
            print_json(&serde_json::json!({ "succeeded": succeeded, "failed": failed }))?;
            if !report.is_success() {
                exn::bail!(ErrorKind::Command("recompute"));
            }
            Ok(())
        },
        Command::SyncComplete => dispatch(services, Trigger::SyncCompleted, "sync-complete").await,
        Command::RestrictionChanged { user } => {
            dispatch(services, Trigger::RestrictionChanged { user_id: user }, "restriction-changed").await
        },
        Command::Hide(Target { user, entity_type, id }) => {
            let trigger = Trigger::Hidden { user_id: user, entity_type, entity_id: id };
            dispatch(services, trigger, "hide").await
        },
        Command::Unhide { target: Target { user, entity_type, id }, no_drain } => {
            let trigger = Trigger::Unhidden { user_id: user, entity_type, entity_id: id };
            dispatch(services, trigger, "unhide").await?;
            if !no_drain {
                let drained = services.worker().drain().await.or_raise(|| ErrorKind::Command("unhide"))?;
                info!(completed = drained.completed, failed = drained.failed, "ran queued recomputes");
            }
            Ok(())
        },
        Command::List(args) => list(services, args).await,
        Command::Count { user, entity_type } => {
            let count = Catalog::from(&services.db)
                .visible_count(user, entity_type)
                .await
                .or_raise(|| ErrorKind::Command("count"))?;
            print_json(&count)
        },
        Command::Report => {
            let report = ExclusionRepository::from(&services.db).report().await.or_raise(|| ErrorKind::Command("report"))?;
            print_json(&report)
        },
        Command::Worker => {
            let cancel = CancellationToken::new();
            let handle = services.worker().spawn(cancel.clone());
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "could not listen for ctrl-c, stopping");
            }
            cancel.cancel();
            handle.await.or_raise(|| ErrorKind::Command("worker"))
        },
    }
}

async fn dispatch(services: &Services, trigger: Trigger, name: &'static str) -> Result<()> {
    let outcome = services.dispatcher.dispatch(trigger).await.or_raise(|| ErrorKind::Command(name))?;
    match outcome {
        Outcome::RecomputedAll(report) => {
            let succeeded = report.succeeded.len();
            print_json(&serde_json::json!({ "succeeded": succeeded, "failed": report.failed.len() }))?;
            if !report.is_success() {
                exn::bail!(ErrorKind::Command(name));
            }
            Ok(())
        },
        Outcome::Recomputed(recomputed) => print_json(&recomputed.rows),
        Outcome::Hidden(outcome) => print_json(&serde_json::json!({
            "newly_hidden": outcome.newly_hidden,
            "excluded": outcome.excluded,
            "cascaded": outcome.cascaded,
        })),
        Outcome::Unhidden { queued } => print_json(&serde_json::json!({ "queued": queued })),
    }
}

async fn list(services: &Services, args: ListArgs) -> Result<()> {
    let common = CommonFilter { query: args.query.clone(), ids: None };
    let catalog = Catalog::from(&services.db);
    match args.entity_type {
        EntityType::Scene => list_as::<Scene>(&catalog, &args, SceneFilter { common, ..Default::default() }).await,
        EntityType::Performer => {
            list_as::<Performer>(&catalog, &args, PerformerFilter { common, ..Default::default() }).await
        },
        EntityType::Studio => list_as::<Studio>(&catalog, &args, StudioFilter { common, ..Default::default() }).await,
        EntityType::Tag => list_as::<Tag>(&catalog, &args, TagFilter { common, ..Default::default() }).await,
        EntityType::Group => list_as::<Group>(&catalog, &args, GroupFilter { common, ..Default::default() }).await,
        EntityType::Gallery => {
            list_as::<Gallery>(&catalog, &args, GalleryFilter { common, ..Default::default() }).await
        },
        EntityType::Image => list_as::<Image>(&catalog, &args, ImageFilter { common, ..Default::default() }).await,
    }
}

async fn list_as<T: Listing + Serialize>(catalog: &Catalog, args: &ListArgs, filter: T::Filter) -> Result<()> {
    if args.ids {
        let ids = catalog.find_ids::<T>(args.user, &filter).await.or_raise(|| ErrorKind::Command("list"))?;
        return print_json(&ids);
    }
    let field = match args.sort {
        SortArg::Id => SortField::Id,
        SortArg::Name => SortField::Name,
        SortArg::Created => SortField::CreatedAt,
    };
    let direction = if args.desc { Direction::Desc } else { Direction::Asc };
    let options = FindOptions::new(filter).page(args.page, args.page_size).sorted(field, direction);
    let page = catalog.find::<T>(args.user, &options).await.or_raise(|| ErrorKind::Command("list"))?;
    print_json(&page)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let mut out = stdout().lock();
    serde_json::to_writer_pretty(&mut out, value).or_raise(|| ErrorKind::Output)?;
    writeln!(out).or_raise(|| ErrorKind::Output)
}
