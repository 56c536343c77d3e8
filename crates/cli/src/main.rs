//! Resale CLI - command-line storefront client.
//!
//! # Usage
//!
//! ```bash
//! # Browse and fill the cart
//! resale products list --brand reima
//! resale cart add 12
//! resale cart set 12 2
//!
//! # Place the order
//! resale checkout --name "Анна" --phone "+7 900 123-45-67" --delivery ozon
//!
//! # Operator: schedule an announcement (Moscow time)
//! RESALE_API_TOKEN=... resale announcements create --at 2025-03-01T11:00 --product 12
//! ```
//!
//! # Environment Variables
//!
//! - `RESALE_API_URL` - Shop server origin (default `http://localhost:55501`)
//! - `RESALE_API_TOKEN` - Operator credential, required for announcements
//! - `RESALE_SESSION_FILE` - Where the session token is kept
//! - `RESALE_REQUEST_TIMEOUT_SECS` - Per-request timeout (default 60)
//! - `RESALE_CATALOG_CACHE_TTL_SECS` - Product listing cache TTL (default 30)
//! - `RUST_LOG` - Log filter (default `resale_storefront=info,resale_cli=info`)

#![cfg_attr(not(test), forbid(unsafe_code))]

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resale_core::{DeliveryMethod, ProductId};
use resale_storefront::Storefront;
use resale_storefront::checkout::OrderDraft;
use resale_storefront::config::StorefrontConfig;

mod commands;

use commands::CliError;
use commands::cart::CartCommand;

#[derive(Parser)]
#[command(name = "resale")]
#[command(author, version, about = "Resale shop storefront client")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or reset the anonymous session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Browse products
    Products {
        #[command(subcommand)]
        action: ProductsAction,
    },
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Place an order for the cart
    Checkout(CheckoutArgs),
    /// Manage scheduled announcements (operator)
    Announcements {
        #[command(subcommand)]
        action: AnnouncementsAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Show the session token
    Show,
    /// Forget the session and start over with an empty cart
    Reset,
}

#[derive(Subcommand)]
enum ProductsAction {
    /// List products
    List {
        /// Include products scheduled for later
        #[arg(long)]
        all: bool,

        /// Only products whose brand contains this text
        #[arg(short, long)]
        brand: Option<String>,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart
    Show,
    /// Add one unit of a product
    Add { product_id: i64 },
    /// Set a line's quantity; zero or less removes it
    Set {
        product_id: i64,
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove a product's line
    Remove { product_id: i64 },
    /// Empty the cart
    Clear,
}

#[derive(clap::Args)]
struct CheckoutArgs {
    /// Customer name
    #[arg(short, long)]
    name: String,

    /// Contact phone
    #[arg(short, long)]
    phone: String,

    /// Contact email
    #[arg(short, long)]
    email: Option<String>,

    /// Delivery address or pickup point
    #[arg(short, long)]
    address: Option<String>,

    /// Delivery method
    #[arg(short, long, value_enum, default_value = "avito")]
    delivery: DeliveryArg,

    /// Comment for the shop
    #[arg(short, long)]
    comment: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum DeliveryArg {
    Avito,
    Yandex,
    Ozon,
    #[value(name = "5post")]
    FivePost,
}

impl From<DeliveryArg> for DeliveryMethod {
    fn from(arg: DeliveryArg) -> Self {
        match arg {
            DeliveryArg::Avito => Self::Avito,
            DeliveryArg::Yandex => Self::Yandex,
            DeliveryArg::Ozon => Self::Ozon,
            DeliveryArg::FivePost => Self::FivePost,
        }
    }
}

#[derive(Subcommand)]
enum AnnouncementsAction {
    /// List announcements
    List,
    /// Schedule an announcement
    Create {
        /// Send time in Moscow time, `YYYY-MM-DDTHH:MM`
        #[arg(long)]
        at: String,

        /// Featured product (repeatable)
        #[arg(long = "product", required = true)]
        products: Vec<i64>,

        /// Message text (defaults to the standard template)
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Delete an announcement
    Delete { id: i64 },
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "resale_storefront=info,resale_cli=info".into());

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json);

    match run(cli).await {
        Ok(output) => {
            #[allow(clippy::print_stdout)]
            {
                println!("{output}");
            }
        }
        Err(e) => {
            tracing::debug!("Command failed: {e}");
            #[allow(clippy::print_stderr)]
            {
                eprintln!("{}", e.user_message());
            }
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<String, CliError> {
    let config = StorefrontConfig::from_env()?;
    let shop = Storefront::new(config)?;

    match cli.command {
        Commands::Session { action } => match action {
            SessionAction::Show => Ok(commands::session::show(&shop)),
            SessionAction::Reset => commands::session::reset(&shop),
        },
        Commands::Products { action } => match action {
            ProductsAction::List { all, brand } => {
                commands::products::list(&shop, all, brand.as_deref(), Utc::now()).await
            }
        },
        Commands::Cart { action } => {
            let command = match action {
                CartAction::Show => CartCommand::Show,
                CartAction::Add { product_id } => CartCommand::Add(ProductId::new(product_id)),
                CartAction::Set {
                    product_id,
                    quantity,
                } => CartCommand::Set(ProductId::new(product_id), quantity),
                CartAction::Remove { product_id } => {
                    CartCommand::Remove(ProductId::new(product_id))
                }
                CartAction::Clear => CartCommand::Clear,
            };
            commands::cart::run(&shop, command).await
        }
        Commands::Checkout(args) => {
            let draft = OrderDraft {
                customer_name: args.name,
                phone: args.phone,
                email: args.email,
                address: args.address,
                delivery_method: args.delivery.into(),
                comment: args.comment,
            };
            commands::checkout::place(&shop, &draft).await
        }
        Commands::Announcements { action } => match action {
            AnnouncementsAction::List => commands::announcements::list(&shop, Utc::now()).await,
            AnnouncementsAction::Create {
                at,
                products,
                message,
            } => commands::announcements::create(&shop, &at, &products, message).await,
            AnnouncementsAction::Delete { id } => {
                commands::announcements::delete(&shop, id).await
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_negative_quantity_and_5post() {
        let cli = Cli::try_parse_from(["resale", "cart", "set", "3", "-1"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Cart {
                action: CartAction::Set {
                    product_id: 3,
                    quantity: -1
                }
            })
        ));

        let cli = Cli::try_parse_from([
            "resale", "checkout", "--name", "A", "--phone", "1", "--delivery", "5post",
        ]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Checkout(CheckoutArgs {
                delivery: DeliveryArg::FivePost,
                ..
            }))
        ));
    }
}
