use httpy::{Bridge, HttpyConfig, MultiMap, Request, Response, RouteTable};
use std::path::PathBuf;
use tracing::{debug, error, info};

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    request: Option<Request>,
    json: bool,
}

impl Args {
    fn from_env() -> Result<Self, String> {
        let argv: Vec<String> = std::env::args().collect();
        Self::parse(&argv)
    }

    fn parse(argv: &[String]) -> Result<Self, String> {
        let prog = argv.first().map(String::as_str).unwrap_or("httpy");
        let mut args = Args::default();
        let mut method = None;
        let mut request = Request::new("", "/");

        let mut iter = argv.iter().skip(1);
        while let Some(arg) = iter.next() {
            let mut value = |name: &str| {
                iter.next()
                    .cloned()
                    .ok_or_else(|| format!("{} requires a value\n\n{}", name, Self::usage(prog)))
            };

            match arg.as_str() {
                "--help" | "-h" => return Err(Self::usage(prog)),
                "--json" => args.json = true,
                "--config" | "-c" => args.config = Some(PathBuf::from(value(arg.as_str())?)),
                "--request" | "-X" => method = Some(value(arg.as_str())?),
                "--path" | "-P" => request.path = value(arg.as_str())?,
                "--data" | "-d" => request.body = value(arg.as_str())?,
                "--header" | "-H" => {
                    let raw = value(arg.as_str())?;
                    let (name, val) = split_pair(&raw, ':')?;
                    request = request.with_header(name, val);
                }
                "--query" | "-q" => {
                    let raw = value(arg.as_str())?;
                    let (name, val) = split_pair(&raw, '=')?;
                    request = request.with_query(name, val);
                }
                "--param" | "-p" => {
                    let raw = value(arg.as_str())?;
                    let (name, val) = split_pair(&raw, '=')?;
                    request = request.with_param(name, val);
                }
                opt => return Err(format!("Unknown option: {}\n\n{}", opt, Self::usage(prog))),
            }
        }

        if let Some(method) = method {
            request.method = method.to_uppercase();
            args.request = Some(request);
        }

        Ok(args)
    }

    fn usage(prog: &str) -> String {
        format!(
            "httpy - call a Python request handler through the embedded bridge\n\n\
            USAGE:\n    {} [OPTIONS]\n\n\
            OPTIONS:\n    \
            -c, --config <FILE>     Configuration file (default: discover httpy.toml)\n    \
            -X, --request <METHOD>  Dispatch one request with this method\n    \
            -P, --path <PATH>       Request path (default: /)\n    \
            -H, --header <K: V>     Request header, repeatable\n    \
            -q, --query <k=v>       Query parameter, repeatable\n    \
            -p, --param <k=v>       Path parameter, repeatable\n    \
            -d, --data <BODY>       Request body\n        \
            --json              Print results as JSON\n    \
            -h, --help              Print help information\n\n\
            Without --request the route table from the init function is printed.",
            prog
        )
    }
}

fn split_pair(raw: &str, sep: char) -> Result<(String, String), String> {
    raw.split_once(sep)
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("Expected NAME{}VALUE, got {:?}", sep, raw))
}

fn load_config(path: Option<&PathBuf>) -> Result<HttpyConfig, String> {
    match path {
        Some(path) => HttpyConfig::load(path).map_err(|e| e.to_string()),
        None => match HttpyConfig::discover() {
            Some((path, loaded)) => {
                let config = loaded.map_err(|e| e.to_string())?;
                debug!(path = %path.display(), "Discovered configuration");
                Ok(config)
            }
            None => Err(format!(
                "No {} found in the current directory or its parents; pass --config",
                httpy::config::CONFIG_FILE_NAME
            )),
        },
    }
}

fn print_routes(routes: &RouteTable, json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(routes).unwrap_or_default());
        return;
    }

    let mut paths: Vec<_> = routes.keys().collect();
    paths.sort();
    for path in paths {
        println!("{:<30} {}", path, routes[path].join(", "));
    }
}

fn print_response(resp: &Response, json: bool) {
    if json {
        let value = serde_json::json!({
            "status": resp.status,
            "headers": resp.headers,
            "body": String::from_utf8_lossy(&resp.body),
        });
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
        return;
    }

    println!("HTTP {}", resp.status);
    print_headers(&resp.headers);
    println!();
    println!("{}", String::from_utf8_lossy(&resp.body));
}

fn print_headers(headers: &MultiMap) {
    let mut names: Vec<_> = headers.keys().collect();
    names.sort();
    for name in names {
        for value in &headers[name] {
            println!("{}: {}", name, value);
        }
    }
}

fn main() {
    let args = match Args::from_env() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let config = match load_config(args.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let _guard = httpy::init_logging(config.logging.to_log_config().with_env());

    let bridge = Bridge::new();
    let routes = match bridge.initialize_with(&config.python) {
        Ok(routes) => routes,
        Err(e) => {
            error!(error = %e, "Failed to initialize python");
            eprintln!("failed to initialize python: {}", e);
            std::process::exit(1);
        }
    };
    info!(handler = %config.python.request_target(), "Bridge initialized");

    let Some(request) = args.request else {
        print_routes(&routes, args.json);
        return;
    };

    match bridge.invoke(&request) {
        Ok(resp) => print_response(&resp, args.json),
        Err(e) => {
            eprintln!("HTTP {}: {}", e.status(), e);
            std::process::exit(1);
        }
    }
}
