use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use toolver::activate::{Activation, Activator, Scope};
use toolver::catalog::Catalog;
use toolver::config::Settings;
use toolver::detect::{DetectedVersion, Detector};
use toolver::doctor::{Doctor, Finding, Severity};
use toolver::environment::{Environment, Shell};
use toolver::fetch::Fetcher;
use toolver::installer::Installer;
use toolver::persist::{StartupFile, StartupSyntax};
use toolver::progress::BarReporter;
use toolver::store::Store;
use toolver::util::{format_bytes, format_duration, sort_versions};
use toolver::Error;
use crate::cli::{Cli, ToolverCommand};

struct Context {
    settings: Settings,
    catalog: Catalog,
    store: Store,
    quiet: bool,
}

impl Context {
    fn load(quiet: bool) -> Result<Self> {
        let settings = Settings::load()?;
        let catalog = Catalog::load(settings.definitions_dir.as_deref())?;
        let store = Store::new(&settings.root);
        Ok(Self {
            settings,
            catalog,
            store,
            quiet,
        })
    }

    fn fetcher(&self) -> Result<Fetcher> {
        let fetcher = Fetcher::new(self.settings.retry_policy(), self.settings.timeout())?;
        Ok(if self.quiet {
            fetcher
        } else {
            fetcher.with_reporter(Box::new(BarReporter::new()))
        })
    }

    fn activator(&self) -> Activator<'_> {
        Activator::new(&self.store, &self.catalog)
    }
}

pub fn execute(cli: Cli) -> Result<()> {
    let ctx = Context::load(cli.quiet)?;
    match cli.command {
        ToolverCommand::Install { tool, version, activate, skip_checksum } => {
            execute_install(&ctx, &tool, &version, activate, skip_checksum)
        }
        ToolverCommand::Use { tool, version, persist } => {
            execute_use(&ctx, &tool, &version, persist)
        }
        ToolverCommand::Uninstall { tool, version } => {
            execute_uninstall(&ctx, &tool, &version)
        }
        ToolverCommand::List { tool, remote } => {
            match (tool, remote) {
                (Some(tool), true) => execute_list_remote(&ctx, &tool),
                (tool, _) => execute_list(&ctx, tool.as_deref()),
            }
        }
        ToolverCommand::Current { tool } => {
            execute_current(&ctx, tool.as_deref())
        }
        ToolverCommand::Which { tool } => {
            execute_which(&ctx, &tool)
        }
        ToolverCommand::Env { shell } => {
            execute_env(&ctx, shell.unwrap_or_else(Shell::detect))
        }
        ToolverCommand::Detect { json, apply } => {
            execute_detect(&ctx, json, apply)
        }
        ToolverCommand::Init { shell, install } => {
            execute_init(shell.unwrap_or_else(Shell::detect), install)
        }
        ToolverCommand::Doctor { json } => {
            execute_doctor(&ctx, json)
        }
    }
}

fn execute_install(ctx: &Context, tool: &str, version: &str, activate: bool, skip_checksum: bool) -> Result<()> {
    let fetcher = ctx.fetcher()?;
    let installer = Installer::new(&ctx.store, &ctx.catalog, &fetcher).with_skip_checksum(skip_checksum);
    let installed = installer.install(tool, version)?;
    println!(
        "{} {} {} in {} ({})",
        "Installed".green().bold(),
        installed.tool,
        installed.version.key().bold(),
        format_duration(installed.fetch.duration),
        format_bytes(installed.fetch.bytes_written)
    );
    println!("  {}", installed.path.display());
    print_warnings(&installed.warnings);

    if activate {
        let descriptor = ctx.catalog.get(tool)?;
        let activation = ctx.activator().activate(descriptor, &installed.version, Scope::Session)?;
        print_activation(&activation);
    }
    Ok(())
}

fn execute_use(ctx: &Context, tool: &str, version: &str, persist: bool) -> Result<()> {
    let descriptor = ctx.catalog.get(tool)?;
    let activator = ctx.activator();
    let resolved = activator.resolve_installed(descriptor, version).map_err(|err| match err {
        Error::NotFound { .. } => Error::NotInstalled {
            tool: descriptor.name.clone(),
            version: version.to_string(),
        },
        other => other,
    })?;
    let scope = if persist { Scope::Persistent } else { Scope::Session };
    let activation = activator.activate(descriptor, &resolved, scope)?;
    print_activation(&activation);
    if let Some(report) = &activation.persisted {
        for (variable, method) in &report.stored {
            println!("  {} {} via {}", "persisted".dimmed(), variable, method);
        }
        for file in &report.startup_files {
            println!("  {} {}", "updated".dimmed(), file.display());
        }
    } else if !activation.environment.is_empty() {
        println!(
            "  Run {} to update the current shell",
            "eval \"$(toolver env)\"".bold()
        );
    }
    Ok(())
}

fn execute_uninstall(ctx: &Context, tool: &str, version: &str) -> Result<()> {
    let fetcher = ctx.fetcher()?;
    let removed = Installer::new(&ctx.store, &ctx.catalog, &fetcher).uninstall(tool, version)?;
    println!("{} {}", "Removed".green().bold(), removed.display());
    Ok(())
}

fn execute_list(ctx: &Context, tool: Option<&str>) -> Result<()> {
    let tools = match tool {
        Some(tool) => vec![ctx.catalog.get(tool)?.name.clone()],
        None => ctx.store.installed_tools()?,
    };
    if tools.is_empty() {
        println!("No tools installed");
        return Ok(());
    }
    for tool in tools {
        let installed = ctx.store.list_installed(&tool)?;
        let current = ctx.store.current(&tool);
        println!("{}", tool.bold());
        if installed.is_empty() {
            println!("   not installed");
        }
        for version in installed {
            let size = format_bytes(ctx.store.disk_usage(&tool, &version));
            if current.as_deref() == Some(version.as_str()) {
                println!(" * {} ({})", version.green(), size);
            } else {
                println!("   {} ({})", version, size);
            }
        }
    }
    Ok(())
}

fn execute_list_remote(ctx: &Context, tool: &str) -> Result<()> {
    let descriptor = ctx.catalog.get(tool)?;
    let fetcher = ctx.fetcher()?;
    let versions = sort_versions(descriptor.fetch_versions(&fetcher)?);
    if versions.is_empty() {
        println!("{} publishes no version listing; pass an exact version to install", descriptor.display_name());
        return Ok(());
    }
    for version in versions {
        let marker = if ctx.store.is_installed(&descriptor.name, &version) { "*" } else { " " };
        println!("{} {}", marker, version);
    }
    Ok(())
}

fn execute_current(ctx: &Context, tool: Option<&str>) -> Result<()> {
    match tool {
        Some(tool) => {
            let tool = &ctx.catalog.get(tool)?.name;
            match ctx.store.current(tool) {
                Some(version) => println!("{}", version),
                None => bail!("No {} version is active. Run `toolver use {} <version>`", tool, tool),
            }
        }
        None => {
            for tool in ctx.store.installed_tools()? {
                if let Some(version) = ctx.store.current(&tool) {
                    println!("{} {}", tool.bold(), version);
                }
            }
        }
    }
    Ok(())
}

fn execute_which(ctx: &Context, tool: &str) -> Result<()> {
    let tool = &ctx.catalog.get(tool)?.name;
    let Some(version) = ctx.store.current(tool) else {
        bail!("No {} version is active. Run `toolver use {} <version>`", tool, tool);
    };
    println!("{}", ctx.store.version_dir(tool, &version).display());
    Ok(())
}

fn execute_env(ctx: &Context, shell: Shell) -> Result<()> {
    let activator = ctx.activator();
    let mut environment = Environment::default();
    for tool in ctx.store.installed_tools()? {
        let Some(descriptor) = ctx.catalog.find(&tool) else {
            log::debug!("Skipping {}: not in the catalog", tool);
            continue;
        };
        if let Some(env) = activator.current_environment(descriptor) {
            environment.extend(env);
        }
    }
    print!("{}", environment.render(shell));
    Ok(())
}

fn execute_detect(ctx: &Context, json: bool, apply: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Could not read the current directory")?;
    let detected = Detector::from_catalog(&ctx.catalog).detect_all(&cwd);

    if json {
        println!("{}", serde_json::to_string_pretty(&detected)?);
    } else if detected.is_empty() {
        println!("No version files found");
    } else {
        for found in &detected {
            println!(
                "{} {} ({})",
                found.tool.bold(),
                found.version,
                found.source.display().to_string().dimmed()
            );
        }
    }

    if apply {
        for found in &detected {
            apply_detected(ctx, found)
                .with_context(|| format!("Could not apply {} {}", found.tool, found.version))?;
        }
    }
    Ok(())
}

fn apply_detected(ctx: &Context, found: &DetectedVersion) -> Result<()> {
    let descriptor = ctx.catalog.get(&found.tool)?;
    let activator = ctx.activator();
    let version = match activator.resolve_installed(descriptor, &found.version) {
        Ok(version) if ctx.store.is_installed(&descriptor.name, &version.key()) => version,
        _ => {
            let fetcher = ctx.fetcher()?;
            let installer = Installer::new(&ctx.store, &ctx.catalog, &fetcher);
            let installed = installer.install(&descriptor.name, &found.version)?;
            print_warnings(&installed.warnings);
            installed.version
        }
    };
    let activation = activator.activate(descriptor, &version, Scope::Session)?;
    print_activation(&activation);
    Ok(())
}

fn execute_init(shell: Shell, install: bool) -> Result<()> {
    let hook = shell.init_hook("toolver");
    if !install {
        println!("{}", hook);
        return Ok(());
    }
    let syntax = match shell {
        Shell::Posix => StartupSyntax::Posix,
        Shell::PowerShell => StartupSyntax::PowerShell,
        Shell::Cmd => bail!("cmd has no startup file; save this line in a .cmd script instead:\n{}", hook),
    };
    let files: Vec<StartupFile> = StartupFile::for_user()
        .into_iter()
        .filter(|file| file.syntax() == syntax)
        .collect();
    if files.is_empty() {
        bail!("No {} startup file found; add this line to your shell profile:\n{}", shell, hook);
    }
    for file in files {
        let changed = file
            .apply("init", &hook)
            .with_context(|| format!("Could not update {}", file.path().display()))?;
        if changed {
            println!("{} {}", "Updated".green().bold(), file.path().display());
        } else {
            println!("{} already loads toolver", file.path().display());
        }
    }
    Ok(())
}

fn execute_doctor(ctx: &Context, json: bool) -> Result<()> {
    let findings = Doctor::new(&ctx.store, &ctx.catalog).run();
    if json {
        println!("{}", serde_json::to_string_pretty(&findings)?);
        return Ok(());
    }
    for finding in &findings {
        print_finding(finding);
    }
    let issues = findings.iter().filter(|f| f.is_issue()).count();
    println!();
    if issues == 0 {
        println!("{}", "No issues found".green().bold());
    } else {
        println!("{}", format!("Found {} issue(s)", issues).yellow().bold());
    }
    Ok(())
}

fn print_finding(finding: &Finding) {
    let marker = match finding.severity {
        Severity::Ok => "ok".green(),
        Severity::Info => "info".blue(),
        Severity::Warn => "warn".yellow(),
        Severity::Fail => "fail".red().bold(),
    };
    println!("[{}] {}", marker, finding.message);
    if let Some(hint) = &finding.hint {
        println!("       {} {}", "hint:".dimmed(), hint);
    }
}

fn print_activation(activation: &Activation) {
    println!(
        "{} {} {}",
        "Now using".green().bold(),
        activation.tool,
        activation.version.key().bold()
    );
    for (name, value) in &activation.environment.vars {
        println!("  {}={}", name, value.display());
    }
    print_warnings(&activation.warnings);
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }
}
