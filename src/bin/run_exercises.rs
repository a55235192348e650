use std::process::ExitCode;

use clap::Parser;
use pointfix::runner::{init_tracing, run_all, verify, Exercise, RunnerArgs};

fn main() -> anyhow::Result<ExitCode> {
    let args = RunnerArgs::parse();
    init_tracing();

    if args.list {
        for ex in Exercise::ALL {
            let note = ex.unavailable().map(|why| format!(" [{why}]")).unwrap_or_default();
            println!("{ex}  {}{note}", ex.title());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let cfg = args.config();

    if args.verify {
        let (lines, ok) = verify(&cfg);
        for line in lines {
            println!("{line}");
        }
        return Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    let exercises = args
        .selected()
        .map_err(|e| anyhow::anyhow!("invalid --only value {:?}: {e}", args.only))?;
    let summary = run_all(&cfg, &exercises);
    println!("{summary}");

    if args.fail_on_error && !summary.all_passed() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
