use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use client_core::{
    config::load_settings, load_entities_with_counts, FetchOutcome, HttpResourceClient,
    InventorySource, MutationExecutor, QueryChanges, QueryCoordinator, QueryDescriptor,
    ResourceClient, ShoppingListSource, SortBy, SortOrder, ViewState,
};
use shared::domain::{
    CategoryId, EntityFields, EntityKind, ExpiryStatus, FoodItem, ItemId, LocationId,
    NewShoppingItem, Resource, ShoppingItem, ShoppingItemId, ShoppingStats,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Overrides `server_url` from client.toml and the environment.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    access_token: Option<String>,
    #[arg(long)]
    page_size: Option<u32>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List inventory items.
    List {
        #[arg(long, value_parser = parse_sort_by, default_value = "expiry_date")]
        sort: SortBy,
        #[arg(long)]
        desc: bool,
        #[arg(long)]
        category: Option<i64>,
        #[arg(long)]
        location: Option<i64>,
        #[arg(long, value_parser = parse_status)]
        status: Option<ExpiryStatus>,
        #[arg(long)]
        search: Option<String>,
        /// How many pages to accumulate.
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    DeleteFood {
        id: i64,
    },
    Categories {
        #[command(subcommand)]
        action: Option<EntityAction>,
    },
    Locations {
        #[command(subcommand)]
        action: Option<EntityAction>,
    },
    Shopping {
        #[arg(long)]
        search: Option<String>,
        #[command(subcommand)]
        action: Option<ShoppingAction>,
    },
}

#[derive(Subcommand, Debug)]
enum ShoppingAction {
    Add {
        name: String,
        #[arg(long)]
        from_food: Option<i64>,
    },
    Check {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    Uncheck {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    ToggleAll {
        #[arg(long)]
        uncheck: bool,
    },
    ClearChecked,
    Remove {
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum EntityAction {
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Rename {
        id: i64,
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Delete {
        id: i64,
    },
}

fn parse_sort_by(raw: &str) -> Result<SortBy, String> {
    match raw {
        "expiry_date" | "expiry" => Ok(SortBy::ExpiryDate),
        "name" => Ok(SortBy::Name),
        "quantity" => Ok(SortBy::Quantity),
        "created_at" | "created" => Ok(SortBy::CreatedAt),
        other => Err(format!("unknown sort field '{other}'")),
    }
}

fn parse_status(raw: &str) -> Result<ExpiryStatus, String> {
    match raw {
        "normal" => Ok(ExpiryStatus::Normal),
        "expiring_soon" | "expiring" => Ok(ExpiryStatus::ExpiringSoon),
        "expired" => Ok(ExpiryStatus::Expired),
        other => Err(format!("unknown status '{other}'")),
    }
}

async fn load_view<T: Resource>(coordinator: &QueryCoordinator<T>) -> Result<ViewState<T>> {
    coordinator.load().await;
    let view = coordinator.view().await;
    if let Some(err) = &view.error {
        bail!("failed to load: {err}");
    }
    Ok(view)
}

fn print_shopping(items: &[ShoppingItem]) {
    for item in items {
        let mark = if item.is_checked { "x" } else { " " };
        println!("[{mark}] {:>5}  {}", item.id.0, item.item_name);
    }
    let stats = ShoppingStats::from_items(items);
    println!(
        "{} items, {} checked, {} left ({:.1}% done)",
        stats.total, stats.checked, stats.unchecked, stats.completion_rate
    );
}

async fn entities(
    client: &dyn ResourceClient,
    kind: EntityKind,
    action: Option<EntityAction>,
    width: usize,
) -> Result<()> {
    match action {
        None => {
            for count in load_entities_with_counts(client, kind, width).await? {
                let system = if count.entity.is_system { " (system)" } else { "" };
                println!(
                    "{:>5}  {:<24} {:>4} items{system}",
                    count.entity.id, count.entity.name, count.item_count
                );
            }
        }
        Some(EntityAction::Add { name, description }) => {
            let entity = client
                .create_entity(kind, &EntityFields { name, description })
                .await?;
            println!("created {} id={}", kind.collection_path(), entity.id);
        }
        Some(EntityAction::Rename {
            id,
            name,
            description,
        }) => {
            let entity = client
                .update_entity(kind, id, &EntityFields { name, description })
                .await?;
            println!("updated id={} name={}", entity.id, entity.name);
        }
        Some(EntityAction::Delete { id }) => {
            client.delete_entity(kind, id).await?;
            println!("deleted id={id}");
        }
    }
    Ok(())
}

async fn shopping(
    client: Arc<dyn ResourceClient>,
    descriptor: QueryDescriptor,
    action: Option<ShoppingAction>,
) -> Result<()> {
    let source = Arc::new(ShoppingListSource::new(client.clone()));
    let coordinator = QueryCoordinator::<ShoppingItem>::new(source.clone(), descriptor);
    load_view(&coordinator).await?;
    let executor =
        MutationExecutor::with_events(coordinator.window(), source, coordinator.event_sender());

    match action {
        None => {}
        Some(ShoppingAction::Add { name, from_food }) => {
            let item = client
                .add_shopping_item(&NewShoppingItem {
                    item_name: name,
                    created_from_food_id: from_food.map(ItemId),
                })
                .await?;
            println!("added shopping item id={}", item.id.0);
            coordinator.refresh().await;
        }
        Some(ShoppingAction::Check { ids }) => {
            let updates: Vec<_> = ids
                .into_iter()
                .map(|id| (ShoppingItemId(id), true))
                .collect();
            executor.batch_update(&updates).await?;
        }
        Some(ShoppingAction::Uncheck { ids }) => {
            let updates: Vec<_> = ids
                .into_iter()
                .map(|id| (ShoppingItemId(id), false))
                .collect();
            executor.batch_update(&updates).await?;
        }
        Some(ShoppingAction::ToggleAll { uncheck }) => {
            let changed = executor.toggle_all(!uncheck).await?;
            println!("updated {changed} items");
        }
        Some(ShoppingAction::ClearChecked) => {
            let removed = executor.clear_completed().await?;
            println!("removed {removed} checked items");
        }
        Some(ShoppingAction::Remove { id }) => {
            executor.delete_item(ShoppingItemId(id)).await?;
        }
    }

    print_shopping(&coordinator.view().await.items);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    if let Some(token) = cli.access_token {
        settings.access_token = Some(token);
    }
    if let Some(page_size) = cli.page_size {
        settings.page_size = page_size;
    }
    let settings = settings.validate()?;
    info!("pantry: using server {}", settings.server_url);

    let client: Arc<dyn ResourceClient> = Arc::new(HttpResourceClient::from_settings(&settings)?);

    match cli.command {
        Command::List {
            sort,
            desc,
            category,
            location,
            status,
            search,
            pages,
        } => {
            let order = if desc { SortOrder::Desc } else { SortOrder::Asc };
            let changes = QueryChanges::default()
                .sort_by(sort)
                .sort_order(order)
                .category(category.map(CategoryId))
                .location(location.map(LocationId))
                .status(status)
                .search(search.unwrap_or_default());
            let base = QueryDescriptor::with_page_size(settings.page_size);
            let descriptor = base.apply(&changes).unwrap_or(base);

            let source = Arc::new(InventorySource::new(client));
            let coordinator = QueryCoordinator::<FoodItem>::new(source, descriptor);
            load_view(&coordinator).await?;
            for _ in 1..pages {
                match coordinator.load_more().await {
                    FetchOutcome::Applied => {}
                    FetchOutcome::Skipped => break,
                    FetchOutcome::Failed | FetchOutcome::Discarded => {
                        let err = coordinator.view().await.error.unwrap_or_default();
                        bail!("failed to load more: {err}");
                    }
                }
            }

            let view = coordinator.view().await;
            let today = Local::now().date_naive();
            for item in &view.items {
                println!(
                    "{:>5}  {:<24} {:>8} {:<6} {}  {}",
                    item.id.0,
                    item.name,
                    item.quantity,
                    item.unit,
                    item.expiry_date,
                    item.status(today).as_str()
                );
            }
            let more = if view.has_more { ", more available" } else { "" };
            println!(
                "showing {} of {} (page {}{more})",
                view.items.len(),
                view.total_count,
                view.current_page
            );
        }
        Command::DeleteFood { id } => {
            let source = Arc::new(InventorySource::new(client));
            let coordinator = QueryCoordinator::<FoodItem>::new(
                source.clone(),
                QueryDescriptor::with_page_size(settings.page_size),
            );
            load_view(&coordinator).await?;
            let id = ItemId(id);
            // The executor only deletes items it can see; page until it shows up.
            loop {
                let loaded = coordinator.window().lock().await.position(id).is_some();
                if loaded || coordinator.load_more().await != FetchOutcome::Applied {
                    break;
                }
            }
            let executor = MutationExecutor::with_events(
                coordinator.window(),
                source,
                coordinator.event_sender(),
            );
            executor.delete_item(id).await?;
            println!("deleted food id={}", id.0);
        }
        Command::Categories { action } => {
            entities(
                client.as_ref(),
                EntityKind::Category,
                action,
                settings.aggregation_width,
            )
            .await?;
        }
        Command::Locations { action } => {
            entities(
                client.as_ref(),
                EntityKind::Location,
                action,
                settings.aggregation_width,
            )
            .await?;
        }
        Command::Shopping { search, action } => {
            let base = QueryDescriptor::default();
            let descriptor = base
                .apply(&QueryChanges::default().search(search.unwrap_or_default()))
                .unwrap_or(base);
            shopping(client, descriptor, action).await?;
        }
    }

    Ok(())
}
