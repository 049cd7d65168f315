use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use portfolio_chat::chat::{MessageId, Role};
use portfolio_chat::voice::{
    AudioClip, AudioFormat, CaptureStream, FrequencyAnalyser, MicrophoneCapture, PlayTrigger,
    PlaybackEnd, PlaybackResource, SAMPLE_RATE, SpeakerClip, StopReason, VoiceEvent,
    samples_to_wav,
};
use portfolio_chat::widget::SubmitOutcome;
use portfolio_chat::{
    ApiClient, ChatBackend, ChatWidget, Config, NativeAudio, SharedViewport, SpeechBackend, Viewport,
    VoiceTurn, WidgetEvent,
};

/// Portfolio Chat - talk to the portfolio assistant from a terminal
#[derive(Parser)]
#[command(name = "portfolio-chat", version, about)]
struct Cli {
    /// Backend base URL (overrides config file and environment)
    #[arg(long)]
    api_url: Option<String>,

    /// Wait for /play before speaking replies
    #[arg(long)]
    no_autoplay: bool,

    /// Behave like a narrow (mobile) viewport, which offers /close
    #[arg(long)]
    narrow: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,portfolio_chat=warn",
        1 => "info,portfolio_chat=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
        };
    }

    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }
    if cli.no_autoplay {
        config.voice.autoplay = false;
    }
    config.validate()?;
    tracing::debug!(?config, "loaded configuration");

    let client = Arc::new(ApiClient::new(config.api.clone())?);
    let audio = Arc::new(NativeAudio::new(config.voice.sample_rate, config.voice.autoplay));
    let viewport = if cli.narrow {
        Viewport::new(390.0, 844.0)
    } else {
        Viewport::default()
    };
    let viewport = Arc::new(SharedViewport::new(viewport));

    let chat: Arc<dyn ChatBackend> = client.clone();
    let speech: Arc<dyn SpeechBackend> = client;
    let widget = ChatWidget::new(config, chat, speech, audio, viewport);

    tokio::spawn(render(widget.subscribe()));
    chat_loop(&widget).await?;

    widget.stop_recording();
    widget.stop_audio();
    Ok(())
}

const HELP: &str = "commands: /voice /stop /play /mute /close /quit";

/// Read lines from stdin and drive the widget until `/quit` or EOF
async fn chat_loop(widget: &ChatWidget) -> anyhow::Result<()> {
    println!("{}", widget.config().widget.expanded_placeholder);
    println!("{HELP}\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = line.trim().to_owned();
        match command.as_str() {
            "" => {}
            "/quit" | "/exit" => break,
            "/help" => println!("{HELP}"),
            "/voice" => {
                let widget = widget.clone();
                tokio::spawn(async move {
                    match widget.voice_turn().await {
                        VoiceTurn::Busy => println!("(already listening)"),
                        VoiceTurn::NothingHeard => println!("(didn't catch that)"),
                        _ => {}
                    }
                });
            }
            "/stop" => {
                if !widget.stop_recording() {
                    println!("(not recording)");
                }
            }
            "/play" => {
                if !widget.play_pending_audio() {
                    println!("(no reply waiting)");
                }
            }
            "/mute" => {
                widget.stop_audio();
            }
            "/close" => {
                if !widget.close() {
                    println!("(close is only offered on narrow viewports)");
                }
            }
            _ => {
                let widget = widget.clone();
                tokio::spawn(async move {
                    widget.focus_input();
                    if let SubmitOutcome::Rejected(reason) = widget.submit(&line).await {
                        tracing::debug!(?reason, "submission rejected");
                        println!("(still answering, please wait)");
                    }
                });
            }
        }
    }

    Ok(())
}

/// Print widget events as they arrive
async fn render(mut events: broadcast::Receiver<WidgetEvent>) {
    // Reply being streamed and how much of it is already printed
    let mut streaming: Option<(MessageId, usize)> = None;

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "render fell behind");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        match event {
            WidgetEvent::MessageAppended(message) if message.role == Role::Assistant => {
                print!("assistant> ");
                streaming = Some((message.id, 0));
            }
            WidgetEvent::MessageUpdated { id, content } => {
                if let Some((current, printed)) = streaming.as_mut()
                    && *current == id
                {
                    print!("{}", &content[*printed..]);
                    *printed = content.len();
                }
            }
            WidgetEvent::LoadingChanged(false) => {
                if streaming.take().is_some() {
                    println!();
                }
            }
            WidgetEvent::InputChanged(text) if !text.is_empty() => println!("you (voice)> {text}"),
            WidgetEvent::ErrorChanged(Some(error)) => {
                if streaming.take().is_some() {
                    println!();
                }
                println!("! {error}");
            }
            WidgetEvent::Alert(alert) => println!("! {alert}"),
            WidgetEvent::Voice(voice) => render_voice(voice),
            _ => {}
        }
        let _ = std::io::stdout().flush();
    }
}

fn render_voice(event: VoiceEvent) {
    match event {
        VoiceEvent::RecordingStarted => println!("(listening... /stop when done)"),
        VoiceEvent::RecordingTick { seconds } => println!("(listening {seconds}s)"),
        VoiceEvent::RecordingStopped { reason } => match reason {
            StopReason::Silence => println!("(silence detected, transcribing)"),
            StopReason::Manual => println!("(transcribing)"),
        },
        VoiceEvent::PlaybackStarted => println!("(speaking, /mute to stop)"),
        VoiceEvent::PlaybackPending => println!("(spoken reply ready, /play to listen)"),
        VoiceEvent::ProcessingStarted
        | VoiceEvent::ProcessingFinished
        | VoiceEvent::PlaybackEnded => {}
    }
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let config = Config::load()?;
    let silence = &config.voice.silence;
    let capture = MicrophoneCapture::open(SAMPLE_RATE).await?;
    let mut analyser = FrequencyAnalyser::new(silence.fft_size, silence.smoothing);

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("Silence threshold: {:.1}", silence.threshold);
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.recent_samples(sample_rate as usize);
        let energy = calculate_rms(&samples);
        let level = analyser.average_level(&samples);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (level / 255.0 * 50.0).clamp(0.0, 50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);
        let state = if level < silence.threshold { "quiet" } else { "sound" };

        println!(
            "[{:2}s] RMS: {:.4} | Level: {:5.1} {} | [{}]",
            i + 1,
            energy,
            level,
            state,
            meter
        );
    }

    drop(capture);

    println!("\n---");
    println!("Readings marked 'sound' while you talked mean /voice will hear your questions.");
    println!(
        "If every reading was 'quiet', recordings will auto-stop after {:.1}s of silence.",
        (silence.grace_period + silence.window).as_secs_f32()
    );
    println!("Raise the input gain of the default capture device, or lower");
    println!("silence_threshold under [voice] (or PORTFOLIO_CHAT_SILENCE_THRESHOLD).");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    let clip = AudioClip::new(samples_to_wav(&samples, sample_rate)?, AudioFormat::Wav);
    let speaker = SpeakerClip::load(&clip, true)?;
    let ended = speaker.play(PlayTrigger::UserGesture)?;

    match ended.await {
        Ok(PlaybackEnd::Completed) => {}
        Ok(PlaybackEnd::Failed(reason)) => anyhow::bail!("playback failed: {reason}"),
        Err(_) => anyhow::bail!("playback thread exited"),
    }

    println!("\n---");
    println!("Spoken replies go to the same output device as this tone.");
    println!("No tone means /play will stay silent too: make sure the system's");
    println!("default output device is the one you are listening on.");

    Ok(())
}
