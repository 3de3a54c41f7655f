use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use contratos_core::models::{AttachmentKind, ServiceOrderStatus, UserRole};

/// Context used when `--context` is not given.
pub const DEFAULT_CONTEXT: &str = "cli";

#[derive(Parser)]
#[command(name = "contratos")]
#[command(about = "Manage contracts and service orders kept in a Drive-synced database")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the local cache directory
    #[arg(long, global = true, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Execution context; each context keeps its own cached copy
    #[arg(long, global = true, value_name = "NAME", default_value = DEFAULT_CONTEXT)]
    pub context: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the local copy and the remote copy side by side
    Status,
    /// Download the remote copy if it is newer
    Pull,
    /// Upload pending local changes
    Push,
    /// Settle a conflict by choosing one copy
    #[command(group(ArgGroup::new("side").required(true).args(["take_remote", "keep_local"])))]
    Resync {
        /// Discard local changes and download the remote copy
        #[arg(long)]
        take_remote: bool,
        /// Overwrite the remote copy with the local one
        #[arg(long)]
        keep_local: bool,
    },
    /// Check a user's credentials
    Login {
        login: String,
        #[arg(long)]
        password: String,
    },
    /// Companies
    Company {
        #[command(subcommand)]
        command: CompanyCommands,
    },
    /// Contracts
    Contract {
        #[command(subcommand)]
        command: ContractCommands,
    },
    /// Units
    Unit {
        #[command(subcommand)]
        command: UnitCommands,
    },
    /// Service orders
    Order {
        #[command(subcommand)]
        command: OrderCommands,
    },
    /// Employees
    Employee {
        #[command(subcommand)]
        command: EmployeeCommands,
    },
    /// Users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Upload a file for an order, contract or unit
    Attach {
        #[arg(value_enum)]
        kind: KindArg,
        /// Order code, contract number or unit code
        parent: String,
        /// File to upload
        path: PathBuf,
        #[arg(long)]
        description: Option<String>,
        /// MIME type (guessed from the file name when omitted)
        #[arg(long)]
        mime: Option<String>,
    },
    /// List, download or delete attached files
    Files {
        #[arg(value_enum)]
        kind: KindArg,
        /// Order code, contract number or unit code
        parent: String,
        /// Download the attachment with this id
        #[arg(long, value_name = "ID", conflicts_with = "remove")]
        fetch: Option<i64>,
        /// Where to write the downloaded file (stored name when omitted)
        #[arg(short, long, value_name = "PATH", requires = "fetch")]
        output: Option<PathBuf>,
        /// Delete the attachment with this id
        #[arg(long, value_name = "ID")]
        remove: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum CompanyCommands {
    Add {
        /// Company code
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        cnpj: String,
        /// Also create the company's Drive folder
        #[arg(long)]
        folder: bool,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    Remove {
        code: String,
    },
}

#[derive(Subcommand)]
pub enum ContractCommands {
    Add {
        /// Contract number
        number: String,
        /// Code of the owning company
        #[arg(long)]
        company: String,
        #[arg(long)]
        contracted: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        specifications: Option<String>,
        /// Also create the contract's Drive folder
        #[arg(long)]
        folder: bool,
    },
    List {
        /// Only contracts of this company
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        json: bool,
    },
    Remove {
        number: String,
    },
}

#[derive(Subcommand)]
pub enum UnitCommands {
    Add {
        /// Unit code
        code: String,
        #[arg(long)]
        contract: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// Also create the unit's Drive folder
        #[arg(long)]
        folder: bool,
    },
    List {
        /// Only units of this contract
        #[arg(long)]
        contract: Option<String>,
        #[arg(long)]
        json: bool,
    },
    Remove {
        code: String,
    },
}

#[derive(Subcommand)]
pub enum OrderCommands {
    /// Create an order with the next free code for today
    Add {
        #[arg(long)]
        unit: String,
        /// Service type
        #[arg(long = "type")]
        service_type: Option<String>,
        #[arg(long, value_enum, default_value_t = StatusArg::Active)]
        status: StatusArg,
        /// Planned execution date (YYYY-MM-DD)
        #[arg(long)]
        execution_date: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Also create the order's Drive folder
        #[arg(long)]
        folder: bool,
    },
    List {
        /// Only orders of this unit
        #[arg(long)]
        unit: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show one order with its unit, contract, company and team
    Show {
        code: String,
        #[arg(long)]
        json: bool,
    },
    /// Change an order's status
    Status {
        code: String,
        #[arg(value_enum)]
        status: StatusArg,
    },
    /// Assign an employee to an order, or remove the assignment
    Assign {
        code: String,
        employee: String,
        #[arg(long)]
        remove: bool,
    },
    /// Delete an order, its assignments and its files
    Remove {
        code: String,
    },
}

#[derive(Subcommand)]
pub enum EmployeeCommands {
    Add {
        /// Employee code
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        cpf: String,
        #[arg(long)]
        birth_date: Option<String>,
        #[arg(long)]
        job_title: Option<String>,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    Remove {
        code: String,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    Add {
        login: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
        #[arg(long, value_enum, default_value_t = RoleArg::Ope)]
        role: RoleArg,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    /// Replace a user's password
    Password {
        login: String,
        #[arg(long)]
        password: String,
    },
    Remove {
        login: String,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KindArg {
    Order,
    Contract,
    Unit,
}

impl From<KindArg> for AttachmentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Order => Self::ServiceOrder,
            KindArg::Contract => Self::Contract,
            KindArg::Unit => Self::Unit,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusArg {
    Active,
    InProgress,
    Paused,
    Closed,
}

impl From<StatusArg> for ServiceOrderStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Active => Self::Active,
            StatusArg::InProgress => Self::InProgress,
            StatusArg::Paused => Self::Paused,
            StatusArg::Closed => Self::Closed,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum RoleArg {
    Admin,
    Ope,
}

impl From<RoleArg> for UserRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => Self::Admin,
            RoleArg::Ope => Self::Operator,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}
