use std::process::ExitCode;
use std::time::Instant;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vidstab_cli::cli::{CliArgs, USAGE};
use vidstab_cli::{
    init_thread_pool, FrameSink, FrameSource, ImageSequenceSink, ImageSequenceSource, StabResult, Stabilizer,
    StreamOutput, StreamingStabilizer, TransformLog,
};

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(env_filter)
        .init();

    let args = match CliArgs::parse(std::env::args().skip(1)) {
        Ok(args) if args.help => {
            println!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> StabResult<()> {
    let settings = args.settings()?;
    init_thread_pool(settings.config.n_threads)?;

    // Fail on a missing input before creating any output
    let mut source = ImageSequenceSource::open(&args.input)?;
    let t0 = Instant::now();

    let written = if args.streaming {
        let mut stabilizer = StreamingStabilizer::new(settings)?;
        let mut sink = ImageSequenceSink::create(&args.output)?;
        loop {
            let frame = source.next_frame()?;
            match stabilizer.stabilize_frame(frame)? {
                StreamOutput::Frame(out) => sink.write_frame(&out)?,
                StreamOutput::Pending => {}
                StreamOutput::EndOfStream => break,
            }
        }
        sink.finish()?;
        sink.written()
    } else {
        let mut stabilizer = Stabilizer::new(settings)?;
        match &args.load_transforms {
            Some(path) => stabilizer.load_transform_log(TransformLog::load(path)?)?,
            None => stabilizer.gen_transforms(&mut source)?,
        }
        if let Some(path) = &args.save_transforms {
            stabilizer.transform_log().save(path)?;
            info!(path = %path.display(), "transform log saved");
        }

        source.rewind()?;
        let mut sink = ImageSequenceSink::create(&args.output)?;
        stabilizer.apply_transforms(&mut source, &mut sink)?
    };

    info!(
        frames = written,
        output = %args.output.display(),
        "stabilized in {:.2?}",
        t0.elapsed()
    );
    Ok(())
}
