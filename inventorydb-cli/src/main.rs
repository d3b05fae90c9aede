use clap::{Args, Parser, Subcommand, ValueEnum};
use inventorydb::{Address, Column, InventoryStore, ProductValues, Selection, SortOrder, SqlValue};
use std::process;

/// inventorydb CLI: read and write the product inventory from the command line
#[derive(Parser)]
#[command(name = "inventorydb", version, about)]
struct Cli {
    /// Path to the data directory (default: current directory)
    #[arg(long, default_value = ".")]
    data_dir: String,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

/// Product fields accepted by insert and the update commands.
#[derive(Args)]
struct FieldArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    price: Option<i64>,
    #[arg(long)]
    quantity: Option<i64>,
    #[arg(long)]
    supplier_name: Option<String>,
    #[arg(long)]
    supplier_phone: Option<i64>,
    /// Field values as a JSON object (e.g. '{"name":"Widget","price":10}')
    #[arg(long, conflicts_with_all = ["name", "price", "quantity", "supplier_name", "supplier_phone"])]
    json: Option<String>,
}

/// A caller-supplied filter with its positional arguments.
#[derive(Args)]
struct FilterArgs {
    /// SQL filter over the products table (e.g. "Quantity < ?")
    #[arg(long)]
    filter: String,
    /// Values bound to the filter's `?` placeholders, in order
    #[arg(long = "arg")]
    args: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// List products
    List {
        /// Columns to return (default: all)
        #[arg(long = "column")]
        columns: Vec<String>,
        /// SQL filter over the products table
        #[arg(long)]
        filter: Option<String>,
        /// Values bound to the filter's `?` placeholders
        #[arg(long = "arg")]
        args: Vec<String>,
        /// Sort order (e.g. "Price DESC")
        #[arg(long)]
        sort: Option<String>,
    },

    /// Get a single product by ID
    Get {
        /// Product ID
        id: i64,
    },

    /// Insert a new product
    Insert {
        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Update one product
    Update {
        /// Product ID
        id: i64,
        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Update every product matching a filter
    UpdateWhere {
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Delete one product
    Delete {
        /// Product ID
        id: i64,
    },

    /// Delete every product matching a filter
    DeleteWhere {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Sell one unit of a product
    Sell {
        /// Product ID
        id: i64,
    },

    /// Add stock to a product
    Restock {
        /// Product ID
        id: i64,
        /// Units received
        #[arg(long, default_value_t = 1)]
        amount: i64,
    },

    /// Show the content type for an address
    Type {
        /// Address (e.g. content://com.example.android.inventoryapp/products/1)
        address: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let store = InventoryStore::open(&cli.data_dir)?;
    log::debug!("Opened store at {}", cli.data_dir);

    match cli.command {
        Command::List {
            columns,
            filter,
            args,
            sort,
        } => {
            let projection = parse_columns(&columns)?;
            let selection = filter.map(|clause| selection_with_args(clause, &args));
            let sort = sort.map(SortOrder::new);
            let cursor = store.query(
                &store.products_address(),
                &projection,
                selection,
                sort.as_ref(),
            )?;
            print_output(&cursor.to_json(), &cli.format)?;
        }

        Command::Get { id } => {
            let product = store
                .get_product(id)?
                .ok_or_else(|| format!("Product not found: {id}"))?;
            print_output(&serde_json::to_value(product)?, &cli.format)?;
        }

        Command::Insert { fields } => {
            let values = fields.into_values()?;
            let address = store.insert(&store.products_address(), &values)?;
            print_output(
                &serde_json::json!({ "ok": true, "address": address.to_string() }),
                &cli.format,
            )?;
        }

        Command::Update { id, fields } => {
            let values = fields.into_values()?;
            let rows = store.update(&store.product_address(id), &values, None)?;
            print_output(&serde_json::json!({ "ok": true, "updated": rows }), &cli.format)?;
        }

        Command::UpdateWhere { filter, fields } => {
            let values = fields.into_values()?;
            let selection = selection_with_args(filter.filter, &filter.args);
            let rows = store.update(&store.products_address(), &values, Some(selection))?;
            print_output(&serde_json::json!({ "ok": true, "updated": rows }), &cli.format)?;
        }

        Command::Delete { id } => {
            let rows = store.delete(&store.product_address(id), None)?;
            print_output(&serde_json::json!({ "ok": true, "deleted": rows }), &cli.format)?;
        }

        Command::DeleteWhere { filter } => {
            let selection = selection_with_args(filter.filter, &filter.args);
            let rows = store.delete(&store.products_address(), Some(selection))?;
            print_output(&serde_json::json!({ "ok": true, "deleted": rows }), &cli.format)?;
        }

        Command::Sell { id } => {
            let quantity = store.record_sale(&store.product_address(id))?;
            print_output(
                &serde_json::json!({ "ok": true, "id": id, "quantity": quantity }),
                &cli.format,
            )?;
        }

        Command::Restock { id, amount } => {
            let quantity = store.receive_stock(&store.product_address(id), amount)?;
            print_output(
                &serde_json::json!({ "ok": true, "id": id, "quantity": quantity }),
                &cli.format,
            )?;
        }

        Command::Type { address } => {
            let address = Address::parse(&address)?;
            let content_type = store.content_type(&address)?;
            print_output(
                &serde_json::json!({ "address": address.to_string(), "type": content_type }),
                &cli.format,
            )?;
        }
    }

    Ok(())
}

impl FieldArgs {
    fn into_values(self) -> Result<ProductValues, Box<dyn std::error::Error>> {
        if let Some(json) = self.json {
            let value: serde_json::Value = serde_json::from_str(&json)?;
            return Ok(ProductValues::from_json(&value)?);
        }

        let mut values = ProductValues::new();
        if let Some(name) = self.name {
            values = values.name(name);
        }
        if let Some(price) = self.price {
            values = values.price(price);
        }
        if let Some(quantity) = self.quantity {
            values = values.quantity(quantity);
        }
        if let Some(supplier) = self.supplier_name {
            values = values.supplier_name(supplier);
        }
        if let Some(phone) = self.supplier_phone {
            values = values.supplier_phone(phone);
        }
        Ok(values)
    }
}

fn parse_columns(names: &[String]) -> Result<Vec<Column>, String> {
    names
        .iter()
        .map(|name| Column::from_name(name).ok_or_else(|| format!("Unknown column '{name}'")))
        .collect()
}

fn selection_with_args(clause: String, args: &[String]) -> Selection {
    args.iter()
        .fold(Selection::new(clause), |selection, arg| selection.arg(to_sql_value(arg)))
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
        }
    }
    Ok(())
}

/// Filter arguments that look like integers bind as integers, the rest as text.
fn to_sql_value(raw: &str) -> SqlValue {
    match raw.parse::<i64>() {
        Ok(n) => SqlValue::Integer(n),
        Err(_) => SqlValue::Text(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_args_bind_by_shape() {
        assert_eq!(to_sql_value("12"), SqlValue::Integer(12));
        assert_eq!(to_sql_value("Acme"), SqlValue::Text("Acme".into()));
        let selection = selection_with_args("Quantity < ?".into(), &["3".into()]);
        assert_eq!(selection.args(), &[SqlValue::Integer(3)]);
    }

    #[test]
    fn test_parse_columns() {
        assert_eq!(
            parse_columns(&["Product_Name".into(), "quantity".into()]).unwrap(),
            vec![Column::Name, Column::Quantity]
        );
        assert!(parse_columns(&["colour".into()]).is_err());
    }

    #[test]
    fn test_cli_parses_update_where() {
        let cli = Cli::try_parse_from([
            "inventorydb", "update-where", "--filter", "Quantity = ?", "--arg", "0", "--quantity", "5",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::UpdateWhere { .. }));
    }
}
