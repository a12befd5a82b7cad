use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use taskdesk::router::{HOME_ROUTE, LOGIN_ROUTE, TASKS_ROUTE};
use taskdesk::{
    ApiError, AppContext, ClientConfig, CreateTask, FileTokenStore, TaskStatus, TokenStore, UpdateTask, csrf,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("missing credentials; pass --email/--password or set TASKS_EMAIL/TASKS_PASSWORD")]
    MissingCredentials,
    #[error("navigation to {requested} ended at {landed}")]
    Redirected { requested: String, landed: String },
    #[error("nothing to update; pass --title, --description or --status")]
    EmptyUpdate,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "taskdesk", about = "Task manager API client")]
struct Cli {
    /// API origin; overrides TASKS_API_URL.
    #[arg(long)]
    api_url: Option<String>,

    #[arg(long, env = "TASKS_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "TASKS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a fresh CSRF cookie.
    Csrf,
    Login,
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Whoami,
    Logout,
    Token(TokenCommand),
    Tasks(TasksCommand),
}

#[derive(Args, Debug)]
struct TokenCommand {
    #[command(subcommand)]
    command: TokenSubcommand,
}

#[derive(Subcommand, Debug)]
enum TokenSubcommand {
    Set { value: String },
    Clear,
    Show,
}

#[derive(Args, Debug)]
struct TasksCommand {
    #[command(subcommand)]
    command: TasksSubcommand,
}

#[derive(Subcommand, Debug)]
enum TasksSubcommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// pending, in_progress or completed
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    Update {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    Delete {
        id: u64,
    },
}

/// Credentials from the global flags, used when a command needs a session.
struct Login {
    email: Option<String>,
    password: Option<String>,
}

impl Login {
    fn required(&self) -> Result<(&str, &str), CliError> {
        match (self.email.as_deref(), self.password.as_deref()) {
            (Some(email), Some(password)) => Ok((email, password)),
            _ => Err(CliError::MissingCredentials),
        }
    }

    fn is_present(&self) -> bool {
        self.email.is_some() && self.password.is_some()
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let api_url = cli.api_url;
    let config = ClientConfig::from_lookup(|key| match key {
        "TASKS_API_URL" => api_url.clone().or_else(|| std::env::var(key).ok()),
        _ => std::env::var(key).ok(),
    })?;
    let login = Login { email: cli.email, password: cli.password };

    match cli.command {
        Command::Token(token) => run_token(&config, token),
        command => run_session(config, &login, command).await,
    }
}

async fn run_session(config: ClientConfig, login: &Login, command: Command) -> Result<(), CliError> {
    let ctx = AppContext::bootstrap(config).await?;
    match command {
        Command::Csrf => run_csrf(&ctx).await,
        Command::Login => run_login(&ctx, login).await,
        Command::Register { name, email, password } => run_register(&ctx, &name, &email, &password).await,
        Command::Whoami => run_whoami(&ctx).await,
        Command::Logout => run_logout(&ctx, login).await,
        Command::Tasks(tasks) => run_tasks(&ctx, login, tasks).await,
        Command::Token(token) => run_token(ctx.client.config(), token),
    }
}

// =============================================================================
// SESSION COMMANDS
// =============================================================================

async fn run_csrf(ctx: &AppContext) -> Result<(), CliError> {
    csrf::initialize_csrf(&ctx.client).await?;
    print_json(&json!({ "xsrf_token": ctx.client.xsrf_token() }))
}

async fn run_login(ctx: &AppContext, login: &Login) -> Result<(), CliError> {
    let (email, password) = login.required()?;
    let user = ctx.auth.login(email, password).await?;
    print_json(&user)
}

async fn run_register(ctx: &AppContext, name: &str, email: &str, password: &str) -> Result<(), CliError> {
    ctx.auth.register(name, email, password).await?;
    print_json(&json!({ "registered": email }))
}

async fn run_whoami(ctx: &AppContext) -> Result<(), CliError> {
    let landed = ctx.router.navigate(HOME_ROUTE).await;
    let user = match ctx.auth.user() {
        Some(user) if landed == HOME_ROUTE => user,
        _ => return Err(CliError::Redirected { requested: HOME_ROUTE.to_owned(), landed }),
    };
    print_json(&user)
}

async fn run_logout(ctx: &AppContext, login: &Login) -> Result<(), CliError> {
    if login.is_present() {
        let (email, password) = login.required()?;
        ctx.auth.login(email, password).await?;
    }
    ctx.auth.logout().await?;
    print_json(&json!({ "logged_out": true }))
}

fn run_token(config: &ClientConfig, token: TokenCommand) -> Result<(), CliError> {
    let store = FileTokenStore::new(config.token_file.clone());
    match token.command {
        TokenSubcommand::Set { value } => {
            store.store(&value)?;
            print_json(&json!({ "stored": true, "path": store.path() }))
        }
        TokenSubcommand::Clear => {
            store.clear()?;
            print_json(&json!({ "cleared": true, "path": store.path() }))
        }
        TokenSubcommand::Show => print_json(&json!({ "token": store.load()? })),
    }
}

// =============================================================================
// TASK COMMANDS
// =============================================================================

/// Navigate to `route`, logging in once if the guard sends us to the login page.
async fn enter(ctx: &AppContext, login: &Login, route: &str) -> Result<(), CliError> {
    let mut landed = ctx.router.navigate(route).await;
    if landed == LOGIN_ROUTE {
        let (email, password) = login.required()?;
        ctx.auth.login(email, password).await?;
        landed = ctx.router.navigate(route).await;
    }
    if landed != route {
        return Err(CliError::Redirected { requested: route.to_owned(), landed });
    }
    Ok(())
}

async fn run_tasks(ctx: &AppContext, login: &Login, tasks: TasksCommand) -> Result<(), CliError> {
    enter(ctx, login, TASKS_ROUTE).await?;
    let store = &ctx.tasks;

    match tasks.command {
        TasksSubcommand::List { page } => {
            store.fetch_tasks(page).await?;
            print_json(&json!({ "tasks": store.tasks(), "pagination": store.pagination() }))
        }
        TasksSubcommand::Create { title, description, status } => {
            let task = store.create_task(&CreateTask { title, description, status }).await?;
            print_json(&task)
        }
        TasksSubcommand::Update { id, title, description, status } => {
            let changes = UpdateTask { title, description, status };
            if changes.is_empty() {
                return Err(CliError::EmptyUpdate);
            }
            let task = store.update_task(id, &changes).await?;
            print_json(&task)
        }
        TasksSubcommand::Delete { id } => {
            store.delete_task(id).await?;
            print_json(&json!({ "deleted": id }))
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
