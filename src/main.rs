use anyhow::{anyhow, Context, Result};
use board_rank::filter::{filter, FilterCriteria, FilteredView};
use board_rank::index::IndexCache;
use board_rank::institutions::{top_institutions, InstitutionQuery, InstitutionStats};
use board_rank::loader::{Encodings, LoadOutcome, ResultsBoard};
use board_rank::matcher::{IdentityMatcher, MatchOutcome, SourceStudent};
use board_rank::models::{Config, DatasetId, Group};
use board_rank::ranking::StudentDetail;
use board_rank::source::ConfiguredSource;
use board_rank::store::JsonFileStore;
use board_rank::MatchError;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn dataset_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("year")
                .short('y')
                .long("year")
                .required(true)
                .help("Exam year label, e.g. 2023 (SSC) or hsc_2025"),
        )
        .arg(
            Arg::new("group")
                .short('g')
                .long("group")
                .default_value("science")
                .help("Science, Commerce or Arts"),
        )
}

fn cli() -> Command {
    Command::new("board-rank")
        .version("0.1")
        .about("Ranks SSC/HSC board results and links HSC students to their SSC records")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .subcommand_required(true)
        .subcommand(
            dataset_args(Command::new("rank").about("Show the ranked list, optionally filtered"))
                .arg(Arg::new("name").long("name").help("Name contains"))
                .arg(Arg::new("roll").long("roll").help("Roll contains"))
                .arg(Arg::new("institution").long("institution").help("Exact institution name"))
                .arg(
                    Arg::new("gpa")
                        .long("gpa")
                        .action(ArgAction::Append)
                        .value_parser(value_parser!(f64))
                        .help("GPA to include (repeatable)"),
                )
                .arg(Arg::new("min-total").long("min-total").value_parser(value_parser!(u32)))
                .arg(Arg::new("max-total").long("max-total").value_parser(value_parser!(u32)))
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_parser(value_parser!(usize))
                        .default_value("20"),
                )
                .arg(
                    Arg::new("csv")
                        .long("csv")
                        .action(ArgAction::SetTrue)
                        .help("Write the full filtered list to the output directory"),
                ),
        )
        .subcommand(
            dataset_args(Command::new("schools").about("Show top institutions")).arg(
                Arg::new("csv")
                    .long("csv")
                    .action(ArgAction::SetTrue)
                    .help("Write the institution table to the output directory"),
            ),
        )
        .subcommand(
            dataset_args(Command::new("student").about("Show one student's result"))
                .arg(Arg::new("roll").long("roll").required(true)),
        )
        .subcommand(
            Command::new("link")
                .about("Find an HSC student's SSC result")
                .arg(
                    Arg::new("year")
                        .short('y')
                        .long("year")
                        .required(true)
                        .help("HSC year, e.g. 2025 or hsc_2025"),
                )
                .arg(Arg::new("roll").long("roll").required(true).help("HSC roll"))
                .arg(Arg::new("name").long("name").required(true).help("Name as printed on the HSC result"))
                .arg(
                    Arg::new("pick-roll")
                        .long("pick-roll")
                        .help("SSC roll to confirm when several records share the name"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");

    // Load or create configuration
    let config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("Failed to load configuration: {}", config_file))?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        let default_config = Config::default();
        default_config.save_to_file(config_file)?;
        default_config
    };

    let source = Arc::new(ConfiguredSource::from_config(&config)?);
    let encodings = Encodings::from_config(&config);

    match matches.subcommand() {
        Some(("rank", args)) => run_rank(&config, source, encodings, args).await,
        Some(("schools", args)) => run_schools(&config, source, encodings, args).await,
        Some(("student", args)) => run_student(source, encodings, args).await,
        Some(("link", args)) => run_link(&config, source, encodings, args).await,
        _ => Err(anyhow!("unknown command")),
    }
}

fn dataset_from_args(args: &ArgMatches) -> Result<DatasetId> {
    let label = args
        .get_one::<String>("year")
        .context("--year is required")?;
    let (exam, year) = DatasetId::parse_year_label(label)
        .with_context(|| format!("Unrecognised year label: {}", label))?;
    let group = args
        .get_one::<String>("group")
        .map(|g| g.parse::<Group>())
        .transpose()
        .map_err(|e| anyhow!(e))?
        .unwrap_or(Group::Science);
    Ok(DatasetId::new(exam, year, group))
}

async fn load_board(
    source: Arc<ConfiguredSource>,
    encodings: Encodings,
    id: DatasetId,
) -> Result<Arc<board_rank::LoadedDataset>> {
    println!("📂 Loading {} ({})", id, id.summary_file());
    let board = ResultsBoard::new(source, encodings);
    match board
        .load(id)
        .await
        .with_context(|| format!("No data for {}", id))?
    {
        LoadOutcome::Committed(loaded) => Ok(loaded),
        LoadOutcome::Superseded => Err(anyhow!("load of {} was superseded", id)),
    }
}

fn output_dir(config: &Config) -> Result<&str> {
    let dir = config.output_directory.as_deref().unwrap_or("output");
    fs::create_dir_all(dir)?;
    Ok(dir)
}

async fn run_rank(
    config: &Config,
    source: Arc<ConfiguredSource>,
    encodings: Encodings,
    args: &ArgMatches,
) -> Result<()> {
    let id = dataset_from_args(args)?;
    let loaded = load_board(source, encodings, id).await?;

    let total_range = match (
        args.get_one::<u32>("min-total"),
        args.get_one::<u32>("max-total"),
    ) {
        (None, None) => None,
        (min, max) => Some((min.copied().unwrap_or(0), max.copied().unwrap_or(u32::MAX))),
    };
    let criteria = FilterCriteria {
        name: args.get_one::<String>("name").cloned(),
        roll: args.get_one::<String>("roll").cloned(),
        institution: args.get_one::<String>("institution").cloned(),
        gpa_set: args
            .get_many::<f64>("gpa")
            .map(|values| values.copied().collect())
            .unwrap_or_default(),
        total_range,
    };

    let view = filter(&loaded.ranked, &criteria);
    if view.is_empty() {
        println!("❌ No students match the given filters");
        return Ok(());
    }

    let limit = args.get_one::<usize>("limit").copied().unwrap_or(20);
    println!(
        "\n📊 {} — showing {} of {} matching students ({} total)",
        id,
        limit.min(view.len()),
        view.len(),
        loaded.ranked.len()
    );
    println!("{:>6}  {:<32} {:>10} {:>5} {:>6}  {}", "Rank", "Name", "Roll", "GPA", "Total", "Institution");
    for entry in view.entries.iter().take(limit) {
        let r = entry.record;
        println!(
            "{:>6}  {:<32} {:>10} {:>5.2} {:>6}  {}",
            entry.rank, r.name, r.roll_raw, r.gpa, r.total, r.institution
        );
    }

    if args.get_flag("csv") {
        let dir = output_dir(config)?;
        let file_name = format!("ranking_{}_{}.csv", id.year_tag(), id.group.file_slug());
        generate_ranking_csv(&view, &Path::new(dir).join(&file_name))?;
        println!("📄 Wrote {}/{}", dir, file_name);
    }
    Ok(())
}

async fn run_schools(
    config: &Config,
    source: Arc<ConfiguredSource>,
    encodings: Encodings,
    args: &ArgMatches,
) -> Result<()> {
    let id = dataset_from_args(args)?;
    let loaded = load_board(source, encodings, id).await?;
    let query = InstitutionQuery {
        top_n: config.top_rank_threshold,
        min_size: config.min_institution_size,
        limit: config.top_institutions_limit,
    };
    let stats = top_institutions(&loaded.ranked, &query);

    println!("\n🏫 Top {} institutions — {}", stats.len(), id);
    println!(
        "{:>4}  {:<40} {:>8} {:>7} {:>6} {:>9} {:>8}",
        "#", "Institution", "GPA 5 %", "GPA 5", "Count", "Avg total", format!("Top {}", query.top_n)
    );
    for (i, s) in stats.iter().enumerate() {
        println!(
            "{:>4}  {:<40} {:>7.2}% {:>7} {:>6} {:>9.1} {:>8}",
            i + 1,
            s.name,
            s.gpa_max_percent,
            s.gpa_max_count,
            s.student_count,
            s.avg_total,
            s.top_n_count
        );
    }

    if args.get_flag("csv") {
        let dir = output_dir(config)?;
        let file_name = format!("institutions_{}_{}.csv", id.year_tag(), id.group.file_slug());
        generate_institutions_csv(&stats, query.top_n, &Path::new(dir).join(&file_name))?;
        println!("📄 Wrote {}/{}", dir, file_name);
    }
    Ok(())
}

async fn run_student(
    source: Arc<ConfiguredSource>,
    encodings: Encodings,
    args: &ArgMatches,
) -> Result<()> {
    let id = dataset_from_args(args)?;
    let roll = args.get_one::<String>("roll").context("--roll is required")?;
    let loaded = load_board(source, encodings, id).await?;

    match loaded.ranked.detail(roll) {
        Some(detail) => print_detail(&id, &detail),
        None => println!("❌ Result not found for roll {} in {}", roll, id),
    }
    Ok(())
}

async fn run_link(
    config: &Config,
    source: Arc<ConfiguredSource>,
    encodings: Encodings,
    args: &ArgMatches,
) -> Result<()> {
    let label = args.get_one::<String>("year").context("--year is required")?;
    let (_, year) = DatasetId::parse_year_label(label)
        .with_context(|| format!("Unrecognised year label: {}", label))?;
    let roll = args.get_one::<String>("roll").context("--roll is required")?;
    let name = args.get_one::<String>("name").context("--name is required")?;
    let student = SourceStudent::new(year, roll.as_str(), name.as_str());

    let store_path = config.link_store_path.as_deref().unwrap_or("links.json");
    let store = JsonFileStore::open(store_path)
        .with_context(|| format!("Failed to open link store: {}", store_path))?;
    let indexes = Arc::new(IndexCache::new(source, encodings));
    let matcher = IdentityMatcher::new(indexes, store);

    println!("🔍 Searching SSC {} records for \"{}\"...", student.target_year(), name);
    let mapping = match matcher.lookup(&student).await {
        Ok(MatchOutcome::Linked { mapping, cached }) => {
            if cached {
                println!("🔗 Using saved link");
            }
            mapping
        }
        Ok(MatchOutcome::Ambiguous { candidates, .. }) => {
            let Some(pick) = args.get_one::<String>("pick-roll") else {
                println!("⚠️  Multiple SSC records found. Re-run with --pick-roll <ROLL>:");
                for c in &candidates {
                    println!("   Roll {:>10}  {} ({})  {}", c.roll, c.name_raw, c.group, c.institution);
                }
                return Ok(());
            };
            matcher.confirm_roll(&student, &candidates, pick)?
        }
        Err(e @ MatchError::NotFound { .. }) => {
            println!("❌ {}", e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let detail = matcher.linked_record(&mapping).await?;
    print_detail(&mapping.target_dataset(), &detail);
    Ok(())
}

fn print_detail(id: &DatasetId, detail: &StudentDetail) {
    let r = &detail.record;
    println!("\n🎓 {} — {}", id, r.name);
    println!("   Roll: {}", r.roll_raw);
    println!("   Institution: {}", r.institution);
    println!("   GPA: {:.2}", r.gpa);
    println!("   Total: {}", r.total);
    println!("   Board rank: {}", detail.rank);
    if detail.marks.iter().all(|(_, mark)| mark.is_none()) {
        println!("   (subject marks not available)");
        return;
    }
    for (subject, mark) in &detail.marks {
        match mark {
            Some(mark) => println!("   {}: {}", subject.label(), mark),
            None => println!("   {}: -", subject.label()),
        }
    }
}

fn generate_ranking_csv(view: &FilteredView<'_>, path: &Path) -> Result<()> {
    use csv::Writer;

    let mut writer = Writer::from_path(path)?;

    // Write headers
    writer.write_record(["Rank", "Serial", "Name", "Roll", "GPA", "Total", "Institution"])?;

    // Write data
    for entry in &view.entries {
        let r = entry.record;
        writer.write_record([
            entry.rank.to_string(),
            r.serial.map(|s| s.to_string()).unwrap_or_default(),
            r.name.clone(),
            r.roll_raw.clone(),
            format!("{:.2}", r.gpa),
            r.total.to_string(),
            r.institution.clone(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn generate_institutions_csv(stats: &[InstitutionStats], top_n: usize, path: &Path) -> Result<()> {
    use csv::Writer;

    let mut writer = Writer::from_path(path)?;
    writer.write_record([
        "Rank".to_string(),
        "Institution".to_string(),
        "GPA 5 Percent".to_string(),
        "GPA 5 Count".to_string(),
        "Students".to_string(),
        "Average Total".to_string(),
        format!("Top {} Students", top_n),
    ])?;

    for (i, s) in stats.iter().enumerate() {
        writer.write_record([
            (i + 1).to_string(),
            s.name.clone(),
            format!("{:.2}", s.gpa_max_percent),
            s.gpa_max_count.to_string(),
            s.student_count.to_string(),
            format!("{:.1}", s.avg_total),
            s.top_n_count.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
