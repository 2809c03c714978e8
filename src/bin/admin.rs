use xrdadmin::wire::request::PrepareOptions;
use xrdadmin::{AdminClient, Config};

#[tokio::main]
async fn main() {
  env_logger::init();

  let matches = clap::App::new("admin")
    .version("1.0")
    .about("Administrative client for a clustered xrootd-style object storage service.")
    .arg(
      clap::Arg::with_name("url")
        .short("u")
        .long("url")
        .help("Redirector URL, e.g. root://manager.example.com:1094")
        .takes_value(true)
        .required(true),
    )
    .subcommand(clap::SubCommand::with_name("stat").arg(clap::Arg::with_name("path").required(true)))
    .subcommand(
      clap::SubCommand::with_name("locate")
        .arg(clap::Arg::with_name("path").required(true))
        .arg(clap::Arg::with_name("all").long("all"))
        .arg(clap::Arg::with_name("writable").long("writable")),
    )
    .subcommand(
      clap::SubCommand::with_name("mkdir")
        .arg(clap::Arg::with_name("path").required(true))
        .arg(clap::Arg::with_name("mode").long("mode").takes_value(true).default_value("755")),
    )
    .subcommand(clap::SubCommand::with_name("rm").arg(clap::Arg::with_name("path").required(true)))
    .subcommand(clap::SubCommand::with_name("dirlist").arg(clap::Arg::with_name("path").required(true)))
    .subcommand(
      clap::SubCommand::with_name("prepare").arg(clap::Arg::with_name("paths").required(true).multiple(true)),
    )
    .get_matches();

  let url = matches.value_of("url").expect("--url is required");
  let config = Config::from_env();

  let client = match AdminClient::connect(url, &config).await {
    Ok(client) => client,
    Err(err) => {
      eprintln!("failed to connect to {}: {}", url, err);
      std::process::exit(1);
    }
  };

  let result = match matches.subcommand() {
    ("stat", Some(sub)) => run_stat(&client, sub.value_of("path").unwrap()).await,
    ("locate", Some(sub)) => run_locate(&client, sub).await,
    ("mkdir", Some(sub)) => run_mkdir(&client, sub).await,
    ("rm", Some(sub)) => run_rm(&client, sub.value_of("path").unwrap()).await,
    ("dirlist", Some(sub)) => run_dirlist(&client, sub.value_of("path").unwrap()).await,
    ("prepare", Some(sub)) => run_prepare(&client, sub).await,
    _ => {
      eprintln!("no subcommand given; try `admin --help`");
      Ok(())
    }
  };

  client.shutdown().await;

  if let Err(err) = result {
    eprintln!("error: {}", err);
    std::process::exit(1);
  }
}

async fn run_stat(client: &AdminClient, path: &str) -> xrdadmin::AdminResult<()> {
  let info = client.stat(path).await?;
  println!(
    "id={} size={} flags={} modtime={}",
    info.id, info.size, info.flags, info.modtime
  );
  Ok(())
}

async fn run_locate(client: &AdminClient, sub: &clap::ArgMatches<'_>) -> xrdadmin::AdminResult<()> {
  let path = sub.value_of("path").unwrap();
  if sub.is_present("all") {
    let hosts = client.locate_all(path).await?;
    for host in hosts {
      println!("{:?} {} writable={}", host.info_type, host.host_port, host.writable);
    }
  } else {
    let writable = sub.is_present("writable");
    match client.locate_one(path, writable).await? {
      Some(host) => println!("{}", host.host_port),
      None => println!("not found"),
    }
  }
  Ok(())
}

async fn run_mkdir(client: &AdminClient, sub: &clap::ArgMatches<'_>) -> xrdadmin::AdminResult<()> {
  let path = sub.value_of("path").unwrap();
  let mode = sub.value_of("mode").unwrap_or("755");
  let digits: Vec<u8> = mode
    .chars()
    .filter_map(|c| c.to_digit(8))
    .map(|d| d as u8)
    .collect();
  let (u, g, o) = match digits.as_slice() {
    [u, g, o] => (*u, *g, *o),
    _ => (7, 5, 5),
  };
  client.mkdir(path, u, g, o).await
}

async fn run_rm(client: &AdminClient, path: &str) -> xrdadmin::AdminResult<()> {
  client.rm(path).await
}

async fn run_dirlist(client: &AdminClient, path: &str) -> xrdadmin::AdminResult<()> {
  for entry in client.dirlist(path).await? {
    println!("{}", entry);
  }
  Ok(())
}

async fn run_prepare(client: &AdminClient, sub: &clap::ArgMatches<'_>) -> xrdadmin::AdminResult<()> {
  let paths: Vec<String> = sub
    .values_of("paths")
    .unwrap()
    .map(str::to_owned)
    .collect();
  client.prepare(&paths, PrepareOptions::empty(), 0).await
}
