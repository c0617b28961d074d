use std::path::{Path, PathBuf};
use std::time::Duration;

use billing_ledger::config::{Config, StoreKind};
use billing_ledger::core::{
    BatchReceipt, Billing, CustomerUpdate, InvoiceEdit, InvoiceLine, ItemUpdate, NewCustomer,
    NewInvoice, NewItem, StockType,
};
use billing_ledger::storage::{FileStore, MemoryStore, RetryingStore, Store};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const DEFAULT_CONFIG: &str = "billing.toml";

#[derive(Parser)]
#[command(name = "billing", about = "Stock batches, invoices and customer balances")]
struct Cli {
    /// Configuration file; defaults apply when `billing.toml` is absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the item catalog
    #[command(subcommand)]
    Item(ItemCommand),
    /// Receive and inspect stock
    #[command(subcommand)]
    Stock(StockCommand),
    /// Manage customers and their balances
    #[command(subcommand)]
    Customer(CustomerCommand),
    /// Create and change invoices
    #[command(subcommand)]
    Invoice(InvoiceCommand),
    /// Claim the next document number for a prefix such as INV, JW or DC
    Number { prefix: String },
}

#[derive(Subcommand)]
enum ItemCommand {
    Add {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "pcs")]
        unit: String,
        #[arg(long, default_value = "")]
        tax_code: String,
        #[arg(long, default_value = "0")]
        tax_rate: Decimal,
        #[arg(long, default_value = "0")]
        low_stock: Decimal,
    },
    List,
    Update {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        unit: Option<String>,
        #[arg(long)]
        tax_code: Option<String>,
        #[arg(long)]
        tax_rate: Option<Decimal>,
        #[arg(long)]
        low_stock: Option<Decimal>,
    },
}

#[derive(Subcommand)]
enum StockCommand {
    /// Record a new batch
    Receive {
        #[arg(long)]
        item: String,
        #[arg(long)]
        quantity: Decimal,
        #[arg(long)]
        purchase_price: Decimal,
        #[arg(long)]
        selling_price: Decimal,
        /// Acquisition date, today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        expiry: Option<NaiveDate>,
        /// purchase, return, damaged or adjustment
        #[arg(long, default_value = "purchase", value_parser = parse_stock_type)]
        stock_type: StockType,
    },
    /// Consolidated stock per item
    List,
    /// Batches of one item
    Batches {
        #[arg(long)]
        item: String,
    },
    /// Items below their low stock level, or below `--threshold`
    Low {
        #[arg(long)]
        threshold: Option<Decimal>,
    },
}

#[derive(Subcommand)]
enum CustomerCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        trn: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        address: String,
        #[arg(long, default_value = "")]
        remarks: String,
    },
    Update {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        trn: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        remarks: Option<String>,
    },
    List,
    /// Compare the stored balance with the invoices
    Reconcile {
        #[arg(long)]
        id: String,
    },
    /// Total sales and open invoices
    Summary {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum InvoiceCommand {
    Create {
        #[arg(long)]
        customer: String,
        /// CODE:QTY:PRICE[:TAX][:free], repeatable
        #[arg(long = "line", required = true, value_parser = parse_line)]
        lines: Vec<InvoiceLine>,
        #[arg(long, default_value = "0")]
        discount: Decimal,
        #[arg(long, default_value = "0")]
        paid: Decimal,
        #[arg(long, default_value = "")]
        remarks: String,
        /// Makes a retried create return the first invoice
        #[arg(long)]
        request_key: Option<Uuid>,
    },
    /// Replace all lines of an invoice
    Edit {
        #[arg(long)]
        number: String,
        #[arg(long = "line", required = true, value_parser = parse_line)]
        lines: Vec<InvoiceLine>,
        #[arg(long, default_value = "0")]
        discount: Decimal,
        #[arg(long, default_value = "0")]
        paid: Decimal,
        #[arg(long, default_value = "")]
        remarks: String,
    },
    Cancel {
        #[arg(long)]
        number: String,
    },
    Pay {
        #[arg(long)]
        number: String,
        #[arg(long)]
        amount: Decimal,
    },
    Show {
        #[arg(long)]
        number: String,
    },
    List {
        #[arg(long)]
        customer: Option<String>,
    },
}

fn parse_stock_type(input: &str) -> Result<StockType, String> {
    match input {
        "purchase" => Ok(StockType::Purchase),
        "return" => Ok(StockType::Return),
        "damaged" => Ok(StockType::Damaged),
        "adjustment" => Ok(StockType::Adjustment),
        other => Err(format!("unknown stock type {other}")),
    }
}

fn parse_line(input: &str) -> Result<InvoiceLine, String> {
    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() < 3 || parts.len() > 5 {
        return Err(format!("expected CODE:QTY:PRICE[:TAX][:free], got {input}"));
    }
    let decimal = |s: &str| {
        s.parse::<Decimal>()
            .map_err(|e| format!("invalid number {s:?}: {e}"))
    };
    let mut line = InvoiceLine::new(parts[0], decimal(parts[1])?, decimal(parts[2])?);
    for extra in &parts[3..] {
        if extra.eq_ignore_ascii_case("free") {
            line = line.free();
        } else {
            line = line.with_tax(decimal(extra)?);
        }
    }
    Ok(line)
}

fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None if Path::new(DEFAULT_CONFIG).exists() => Ok(Config::load(DEFAULT_CONFIG)?),
        None => Ok(Config::default()),
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T)) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text(value);
    }
    Ok(())
}

fn run<S: Store>(
    billing: &Billing<S>,
    command: Commands,
    json: bool,
    currency: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Item(cmd) => match cmd {
            ItemCommand::Add {
                code,
                name,
                unit,
                tax_code,
                tax_rate,
                low_stock,
            } => {
                let item = billing.add_item(
                    NewItem::new(code, name, unit)
                        .with_tax(tax_code, tax_rate)
                        .with_low_stock_level(low_stock),
                )?;
                emit(json, &item, |i| println!("Added item {}", i.code))?;
            }
            ItemCommand::List => {
                emit(json, &billing.list_items()?, |items| {
                    for i in items {
                        println!("{} | {} | {} | tax {}%", i.code, i.name, i.unit, i.tax_rate);
                    }
                })?;
            }
            ItemCommand::Update {
                code,
                name,
                unit,
                tax_code,
                tax_rate,
                low_stock,
            } => {
                let item = billing.update_item(
                    &code,
                    ItemUpdate {
                        name,
                        unit,
                        tax_code,
                        tax_rate,
                        low_stock_level: low_stock,
                    },
                )?;
                emit(json, &item, |i| println!("Updated item {}", i.code))?;
            }
        },
        Commands::Stock(cmd) => match cmd {
            StockCommand::Receive {
                item,
                quantity,
                purchase_price,
                selling_price,
                date,
                expiry,
                stock_type,
            } => {
                let mut receipt = BatchReceipt::purchase(
                    purchase_price,
                    selling_price,
                    quantity,
                    date.unwrap_or_else(|| billing.today()),
                )
                .of_type(stock_type);
                if let Some(expiry) = expiry {
                    receipt = receipt.expiring(expiry);
                }
                let id = billing.add_batch(&item, receipt)?;
                emit(json, &id, |id| println!("Received batch {id} of {item}"))?;
            }
            StockCommand::List => {
                emit(json, &billing.consolidated_stock()?, |rows| {
                    for r in rows {
                        let price = r
                            .latest_selling_price
                            .map(|p| format!("{p} {currency}"))
                            .unwrap_or_else(|| "-".into());
                        let flag = if r.below_threshold { " (low)" } else { "" };
                        println!(
                            "{} | {} | {} {}{} | {}",
                            r.item_code, r.name, r.total_available_quantity, r.unit, flag, price
                        );
                    }
                })?;
            }
            StockCommand::Batches { item } => {
                emit(json, &billing.batches(&item)?, |batches| {
                    for b in batches {
                        println!(
                            "#{} | {} | {}/{} | {} | {}",
                            b.id,
                            b.stock_type,
                            b.available_quantity,
                            b.original_quantity,
                            b.selling_price,
                            b.acquired_at
                        );
                    }
                })?;
            }
            StockCommand::Low { threshold } => {
                emit(json, &billing.low_stock(threshold)?, |rows| {
                    for r in rows {
                        println!("{} | {} | {} {}", r.item_code, r.name, r.total_available_quantity, r.unit);
                    }
                })?;
            }
        },
        Commands::Customer(cmd) => match cmd {
            CustomerCommand::Add {
                name,
                trn,
                phone,
                email,
                address,
                remarks,
            } => {
                let customer = billing.add_customer(NewCustomer {
                    name,
                    trn_no: trn,
                    phone,
                    email,
                    address,
                    remarks,
                })?;
                emit(json, &customer, |c| println!("Added customer {} ({})", c.id, c.name))?;
            }
            CustomerCommand::Update {
                id,
                name,
                trn,
                phone,
                email,
                address,
                remarks,
            } => {
                let customer = billing.update_customer(
                    &id,
                    CustomerUpdate {
                        name,
                        trn_no: trn,
                        phone,
                        email,
                        address,
                        remarks,
                    },
                )?;
                emit(json, &customer, |c| println!("Updated customer {}", c.id))?;
            }
            CustomerCommand::List => {
                emit(json, &billing.list_customers()?, |customers| {
                    for c in customers {
                        println!("{} | {} | {} {currency}", c.id, c.name, c.outstanding_balance);
                    }
                })?;
            }
            CustomerCommand::Reconcile { id } => {
                emit(json, &billing.reconcile(&id)?, |r| {
                    println!(
                        "{}: stored {} {currency}, recomputed {} {currency}, drift {}",
                        r.customer_id, r.stored, r.recomputed, r.drift
                    );
                })?;
            }
            CustomerCommand::Summary { id } => {
                emit(json, &billing.sales_summary(&id)?, |s| {
                    println!(
                        "{}: sales {} {currency}, {} pending invoices",
                        s.customer_id, s.total_sales, s.pending_invoices
                    );
                })?;
            }
        },
        Commands::Invoice(cmd) => match cmd {
            InvoiceCommand::Create {
                customer,
                lines,
                discount,
                paid,
                remarks,
                request_key,
            } => {
                let invoice = billing.create_invoice(NewInvoice {
                    customer_id: customer,
                    lines,
                    discount,
                    paid_amount: paid,
                    remarks,
                    request_key,
                })?;
                emit(json, &invoice, |i| {
                    println!(
                        "Created {} total {} {currency} balance {} ({})",
                        i.invoice_no, i.total_amount, i.balance, i.status
                    );
                })?;
            }
            InvoiceCommand::Edit {
                number,
                lines,
                discount,
                paid,
                remarks,
            } => {
                let invoice = billing.edit_invoice(
                    &number,
                    InvoiceEdit {
                        lines,
                        discount,
                        paid_amount: paid,
                        remarks,
                    },
                )?;
                emit(json, &invoice, |i| {
                    println!(
                        "Edited {} total {} {currency} balance {} ({})",
                        i.invoice_no, i.total_amount, i.balance, i.status
                    );
                })?;
            }
            InvoiceCommand::Cancel { number } => {
                let invoice = billing.cancel_invoice(&number)?;
                emit(json, &invoice, |i| println!("Cancelled {}", i.invoice_no))?;
            }
            InvoiceCommand::Pay { number, amount } => {
                let invoice = billing.record_payment(&number, amount)?;
                emit(json, &invoice, |i| {
                    println!("{} balance {} {currency} ({})", i.invoice_no, i.balance, i.status);
                })?;
            }
            InvoiceCommand::Show { number } => {
                let (invoice, items) = billing.get_invoice(&number)?;
                let value = serde_json::json!({ "invoice": invoice, "items": items });
                emit(json, &value, |_| {
                    println!(
                        "{} | {} | {} | {}",
                        invoice.invoice_no, invoice.customer_id, invoice.date, invoice.status
                    );
                    for item in &items {
                        let free = if item.free { " free" } else { "" };
                        println!(
                            "  {}. {} {} x {} @ {}{} = {}",
                            item.line_no,
                            item.item_code,
                            item.quantity,
                            item.unit,
                            item.unit_price,
                            free,
                            item.line_total
                        );
                    }
                    println!(
                        "  subtotal {} discount {} vat {} total {} {currency}",
                        invoice.subtotal, invoice.discount, invoice.vat_amount, invoice.total_amount
                    );
                    println!("  paid {} balance {}", invoice.paid_amount, invoice.balance);
                })?;
            }
            InvoiceCommand::List { customer } => {
                emit(json, &billing.list_invoices(customer.as_deref())?, |invoices| {
                    for i in invoices {
                        println!(
                            "{} | {} | {} | {} {currency} | {}",
                            i.invoice_no, i.date, i.customer_id, i.total_amount, i.status
                        );
                    }
                })?;
            }
        },
        Commands::Number { prefix } => {
            let number = billing.next_number(&prefix)?;
            emit(json, &number, |n| println!("{n}"))?;
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let retries = cfg.store.retries;
    let delay = Duration::from_millis(cfg.store.retry_delay_ms);
    match cfg.store.kind {
        StoreKind::File => {
            let store = RetryingStore::new(FileStore::open(&cfg.store.path)?, retries, delay);
            let billing = Billing::with_settings(store, cfg.settings());
            run(&billing, cli.command, cli.json, &cfg.currency)
        }
        StoreKind::Memory => {
            let store = RetryingStore::new(MemoryStore::new(), retries, delay);
            let billing = Billing::with_settings(store, cfg.settings());
            run(&billing, cli.command, cli.json, &cfg.currency)
        }
    }
}
