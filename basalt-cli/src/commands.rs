//! CLI command implementations.

use std::fs;
use std::io;
use std::path::Path;

use basalt_common::Module;
use basalt_vm::{NativeRegistry, Vm};
use tracing::{debug, info};

use crate::config::{FileConfig, ImageFormat, RunSettings};
use crate::RunArgs;

/// Load, link and execute an image, then report its exit code.
pub fn run(args: &RunArgs) -> Result<(), i32> {
    let file = match &args.config {
        Some(path) => FileConfig::load(path).map_err(|message| {
            eprintln!("error: {message}");
            1
        })?,
        None => FileConfig::default(),
    };
    let settings = RunSettings::resolve(args, file);
    debug!(image = %settings.image.display(), format = ?settings.format, "resolved settings");

    let module = read_module(&settings.image, settings.format)?;
    info!(
        code = module.code.len(),
        functions = module.functions.len(),
        "loaded module"
    );

    let natives = NativeRegistry::new();
    let mut vm = Vm::load(&module, &natives, settings.vm, io::stdout()).map_err(|e| {
        eprintln!("runtime error: {e}");
        3
    })?;

    let status = vm.execute().map_err(|e| {
        eprintln!("runtime error: {e}");
        3
    })?;

    println!(
        "finished in {} ms with exit code {}",
        status.elapsed.as_millis(),
        status.exit_code
    );

    if let Some(profile) = vm.profile() {
        print!("{profile}");
    }
    Ok(())
}

/// List the declared types and functions of a module container.
pub fn info(path: &Path) -> Result<(), i32> {
    let module = read_module(path, ImageFormat::Module)?;

    println!("code: {} bytes", module.code.len());

    println!("types: {}", module.types.len());
    for (index, ty) in module.types.iter().enumerate() {
        let kind = if ty.is_value_type { "value" } else { "reference" };
        println!("  [{index}] {} ({kind}, {} fields)", ty.name, ty.fields.len());
        for field in &ty.fields {
            println!("      {}: {}", field.name, type_label(&module, field.type_index));
        }
    }

    println!("functions: {}", module.functions.len());
    for (index, func) in module.functions.iter().enumerate() {
        let owner = type_label(&module, func.owner_type);
        let params: Vec<String> = func
            .arguments
            .iter()
            .map(|arg| format!("{}: {}", arg.name, type_label(&module, arg.type_index)))
            .collect();
        let location = if func.is_abstract {
            "native".to_string()
        } else {
            format!("@{}", func.pointed_opcode)
        };
        println!(
            "  [{index}] {owner}.{}({}) {location}",
            func.name,
            params.join(", ")
        );
    }
    Ok(())
}

fn type_label(module: &Module, index: u32) -> String {
    module
        .type_name(index)
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{index}"))
}

fn read_module(path: &Path, format: ImageFormat) -> Result<Module, i32> {
    let bytes = fs::read(path).map_err(|e| {
        eprintln!("error: cannot read '{}': {e}", path.display());
        1
    })?;

    match format {
        ImageFormat::Raw => Ok(Module::from_code(bytes)),
        ImageFormat::Module => Module::decode(&bytes).map_err(|e| {
            eprintln!("error: cannot decode '{}': {e}", path.display());
            1
        }),
    }
}
