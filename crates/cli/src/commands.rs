//! Implementations of each CLI subcommand against a model root handle.

use racer::Value;

use crate::cli::{AddArgs, IncrementArgs, InsertArgs, PathArgs, RemoveArgs, SetArgs};
use crate::output::{print_number, print_text, print_value, print_values, OutputFormat};

fn parse_value(raw: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let json: serde_json::Value = serde_json::from_str(raw)?;
    Ok(Value::from_json(json))
}

pub async fn get(root: &racer::Handle, args: &PathArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let value = root.at(args.path.as_str()).get().await;
    print_value(format, &args.path, value.as_ref());
    Ok(())
}

pub async fn set(root: &racer::Handle, args: &SetArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let value = parse_value(&args.value)?;
    let previous = root.at(args.path.as_str()).set(value).await?;
    print_value(format, "previous", previous.as_ref());
    Ok(())
}

pub async fn set_diff(root: &racer::Handle, args: &SetArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let value = parse_value(&args.value)?;
    let previous = root.at(args.path.as_str()).set_diff(value).await?;
    print_value(format, "previous", previous.as_ref());
    Ok(())
}

pub async fn set_diff_deep(root: &racer::Handle, args: &SetArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let value = parse_value(&args.value)?;
    let previous = root.at(args.path.as_str()).set_diff_deep(value).await?;
    print_value(format, "previous", previous.as_ref());
    Ok(())
}

pub async fn set_null(root: &racer::Handle, args: &SetArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let value = parse_value(&args.value)?;
    let previous = root.at(args.path.as_str()).set_null(value).await?;
    print_value(format, "previous", previous.as_ref());
    Ok(())
}

pub async fn del(root: &racer::Handle, args: &PathArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let previous = root.at(args.path.as_str()).del().await?;
    print_value(format, "removed", previous.as_ref());
    Ok(())
}

pub async fn increment(root: &racer::Handle, args: &IncrementArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let new_value = root.at(args.path.as_str()).increment(args.by).await?;
    print_number(format, "value", new_value);
    Ok(())
}

pub async fn push(root: &racer::Handle, args: &SetArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let value = parse_value(&args.value)?;
    let len = root.at(args.path.as_str()).push(value).await?;
    print_number(format, "length", len as f64);
    Ok(())
}

pub async fn insert(root: &racer::Handle, args: &InsertArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let value = parse_value(&args.value)?;
    let len = root.at(args.path.as_str()).insert(args.index, vec![value]).await?;
    print_number(format, "length", len as f64);
    Ok(())
}

pub async fn remove(root: &racer::Handle, args: &RemoveArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let removed = root.at(args.path.as_str()).remove(args.index, args.count).await?;
    print_values(format, "removed", &removed);
    Ok(())
}

pub async fn add(root: &racer::Handle, args: &AddArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let doc = parse_value(&args.doc)?;
    let created = root.at(args.collection.as_str()).add(doc).await?;
    print_text(format, "id", &created.leaf_segment().unwrap_or_default());
    Ok(())
}

pub async fn dump(model: &racer::Model, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let bundle = model.bundle(Vec::new()).await?;
    match format {
        OutputFormat::Json => println!("{bundle}"),
        OutputFormat::Human => {
            let pretty: serde_json::Value = serde_json::from_str(&bundle)?;
            println!("{}", serde_json::to_string_pretty(&pretty)?);
        }
    }
    Ok(())
}
