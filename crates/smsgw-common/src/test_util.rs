//! Scripted [`CommandRunner`] for tests.
//!
//! Rules match on the command line (`program arg1 arg2 ...`) by prefix; the
//! longest matching prefix wins, later rules win ties. Unmatched commands
//! fail the way a missing binary would.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::exec::{CommandOutput, CommandRunner, ExecError};

type Effect = Box<dyn Fn(&[String]) + Send + Sync>;

enum Response {
    Output(CommandOutput),
    Timeout,
}

struct Rule {
    prefix: String,
    response: Response,
    effect: Option<Effect>,
}

#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `output`.
    pub fn on(mut self, prefix: &str, output: CommandOutput) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            response: Response::Output(output),
            effect: None,
        });
        self
    }

    /// Like [`ScriptedRunner::on`], also running `effect` with the full
    /// argument list (e.g. to create the files the real tool would write).
    pub fn on_with(
        mut self,
        prefix: &str,
        output: CommandOutput,
        effect: impl Fn(&[String]) + Send + Sync + 'static,
    ) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            response: Response::Output(output),
            effect: Some(Box::new(effect)),
        });
        self
    }

    /// Make commands starting with `prefix` time out.
    pub fn on_timeout(mut self, prefix: &str) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            response: Response::Timeout,
            effect: None,
        });
        self
    }

    /// Every command line run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Whether any command line started with `prefix`.
    pub fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, ExecError> {
        let line = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().unwrap().push(line.clone());

        let rule = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, r)| line.starts_with(&r.prefix))
            .max_by_key(|(i, r)| (r.prefix.len(), *i))
            .map(|(_, r)| r);

        let Some(rule) = rule else {
            return Err(ExecError::Spawn {
                program: program.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no scripted response for `{line}`"),
                ),
            });
        };

        if let Some(effect) = &rule.effect {
            effect(args);
        }
        match &rule.response {
            Response::Output(out) => Ok(out.clone()),
            Response::Timeout => Err(ExecError::Timeout {
                program: program.to_string(),
                timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{args, QUERY_TIMEOUT};

    #[tokio::test]
    async fn longest_prefix_wins() {
        let runner = ScriptedRunner::new()
            .on("mmcli", CommandOutput::ok("generic"))
            .on("mmcli -m 0", CommandOutput::ok("modem 0"));

        let out = runner
            .run("mmcli", &args(["-m", "0"]), QUERY_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(out.stdout, "modem 0");

        let out = runner.run("mmcli", &args(["-L"]), QUERY_TIMEOUT).await.unwrap();
        assert_eq!(out.stdout, "generic");
        assert_eq!(runner.calls(), vec!["mmcli -m 0", "mmcli -L"]);
    }

    #[tokio::test]
    async fn unmatched_and_timeout() {
        let runner = ScriptedRunner::new().on_timeout("ping");
        let err = runner.run("ip", &args(["link"]), QUERY_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
        let err = runner.run("ping", &args(["x"]), QUERY_TIMEOUT).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(runner.called("ping x"));
    }

    #[tokio::test]
    async fn effect_sees_arguments() {
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let runner = ScriptedRunner::new().on_with("touch", CommandOutput::ok(""), move |a| {
            sink.lock().unwrap().extend_from_slice(a);
        });
        runner.run("touch", &args(["a", "b"]), QUERY_TIMEOUT).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }
}
