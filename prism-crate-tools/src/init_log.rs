use std::io::Write;

/// 使用默认的 `Info` 级别初始化日志
///
/// 环境变量 `RUST_LOG` 会覆盖默认级别，例如 `RUST_LOG=prism_scene=debug`。
pub fn init_log() {
    init_log_with_level(log::LevelFilter::Info);
}

pub fn init_log_with_level(level: log::LevelFilter) {
    let result = env_logger::Builder::new()
        .format(|buf, record| {
            let level_style = match record.level() {
                log::Level::Info => {
                    buf.default_level_style(log::Level::Info).fg_color(Some(anstyle::AnsiColor::Green.into()))
                }
                log::Level::Warn => {
                    buf.default_level_style(log::Level::Warn).fg_color(Some(anstyle::AnsiColor::Yellow.into()))
                }
                log::Level::Error => {
                    buf.default_level_style(log::Level::Error).fg_color(Some(anstyle::AnsiColor::Red.into()))
                }
                level => buf.default_level_style(level),
            };
            let location_style = anstyle::Style::new().fg_color(Some(anstyle::RgbColor(110, 110, 110).into()));
            let message_style = anstyle::Style::new().fg_color(Some(anstyle::RgbColor(75, 75, 75).into()));

            // windows 下的路径分隔符也要处理
            let file = record.file().unwrap_or("").rsplit(['/', '\\']).next().unwrap_or("");
            let line = record.line().unwrap_or(0);
            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            let level = record.level();

            writeln!(
                buf,
                "{level_style}[{time}] {level:<5}{level_style:#} {location_style}[{file}:{line}]{location_style:#} \
                 {message_style}{}{message_style:#}",
                record.args()
            )
        })
        .filter(None, level)
        .parse_default_env()
        .try_init();

    // 测试中可能被重复初始化
    if let Err(err) = result {
        log::debug!("logger already initialized: {err}");
    }
}
