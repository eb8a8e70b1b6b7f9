use std::collections::BTreeMap;

pub type Properties = BTreeMap<String, String>;

/// Properties the engine sees as its "system" properties: the process
/// environment under `env.`, plus platform values under the names build
/// descriptions conventionally use.
pub fn system_properties() -> Properties {
    let mut props = Properties::new();
    for (key, value) in std::env::vars() {
        props.insert(format!("env.{key}"), value);
    }
    props.insert("os.name".into(), os_name().into());
    props.insert("os.arch".into(), std::env::consts::ARCH.into());
    props.insert("os.family".into(), std::env::consts::FAMILY.into());
    props.insert(
        "file.separator".into(),
        std::path::MAIN_SEPARATOR.to_string(),
    );
    props.insert(
        "path.separator".into(),
        if cfg!(windows) { ";" } else { ":" }.into(),
    );
    props.insert(
        "line.separator".into(),
        if cfg!(windows) { "\r\n" } else { "\n" }.into(),
    );
    if let Ok(home) = std::env::var("HOME") {
        props.insert("user.home".into(), home);
    }
    if let Ok(dir) = std::env::current_dir() {
        props.insert("user.dir".into(), dir.display().to_string());
    }
    if let Ok(user) = std::env::var("USER") {
        props.insert("user.name".into(), user);
    }
    if let Ok(version) = std::env::var("JAVA_VERSION") {
        props.insert("java.version".into(), version);
    }
    props
}

fn os_name() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Mac OS X",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        other => other,
    }
}

/// Overlays `extra` onto `base`; keys in `extra` win.
pub fn merged(base: &Properties, extra: &Properties) -> Properties {
    let mut out = base.clone();
    out.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    out
}
