use std::io::IsTerminal;

use serde_json::Value;
use tapo_core::Credentials;

/// Read password securely based on the provided options.
///
/// Reads a single line from stdin when `password_stdin` is set, otherwise
/// prompts interactively if a terminal is attached.
pub fn read_password(password_stdin: bool, prompt: &str) -> Result<String, String> {
    if password_stdin {
        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .map_err(|e| format!("Failed to read password from stdin: {}", e))?;
        return Ok(input.trim().to_string());
    }

    if std::io::stdin().is_terminal() {
        eprint!("{}: ", prompt);
        rpassword::read_password().map_err(|e| format!("Failed to read password: {}", e))
    } else {
        Err("No password provided. Use --password-stdin when piping input.".to_string())
    }
}

/// Get credentials from CLI options and environment.
///
/// Password is read from TAPO_PASSWORD env var, stdin (if --password-stdin),
/// or interactively prompted. Without a username the device is tried with
/// blank credentials.
pub fn get_credentials(username: Option<String>, password_stdin: bool) -> Result<Credentials, String> {
    let Some(user) = username else {
        return Ok(Credentials::blank());
    };

    if let Ok(pass) = std::env::var("TAPO_PASSWORD") {
        return Ok(Credentials::new(user, pass));
    }

    let prompt = format!("Password for {}", user);
    let pass = read_password(password_stdin, &prompt)?;
    Ok(Credentials::new(user, pass))
}

/// Parse the optional params argument. Params must be a JSON object.
pub fn parse_params(params: Option<&str>) -> Result<Option<Value>, String> {
    let Some(raw) = params else {
        return Ok(None);
    };

    let value: Value =
        serde_json::from_str(raw).map_err(|e| format!("Invalid params JSON: {}", e))?;
    if !value.is_object() {
        return Err("Params must be a JSON object".to_string());
    }
    Ok(Some(value))
}

/// Print a JSON payload.
pub fn print_json_response(payload: &Value) {
    match serde_json::to_string_pretty(payload) {
        Ok(json) => println!("{}", json),
        Err(_) => println!("{}", payload),
    }
}
