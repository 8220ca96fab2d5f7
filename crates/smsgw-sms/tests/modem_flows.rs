//! Send and receive flows against scripted `mmcli` output.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeDelta};

use smsgw_common::config::SmsSettings;
use smsgw_common::exec::CommandOutput;
use smsgw_common::test_util::ScriptedRunner;
use smsgw_sms::{
    CycleReport, MemoryStore, ModemClient, NewReceivedSms, ReceiveError, ReceivedSmsStore,
    SmsError, SmsReceiver, SmsSender, StoreOutcome,
};

const MODEM_LIST: &str = "\
    /org/freedesktop/ModemManager1/Modem/0 [QUALCOMM INCORPORATED] QUECTEL Mobile Broadband Module
    /org/freedesktop/ModemManager1/Modem/1 [Sierra Wireless] EM7455
";

fn modem_view(port: &str, state: &str, signal: u8) -> String {
    format!(
        "\
  --------------------------------
  System   |          primary port: {port}
           |                 ports: {port} (at)
  --------------------------------
  Status   |                 state: {state}
           |        signal quality: {signal}% (recent)
  --------------------------------
  3GPP     |                  imei: 86796204123456{signal}
           |         operator name: Maroc Telecom
"
    )
}

fn sms_view(number: &str, text: &str, timestamp: &str) -> String {
    format!(
        "\
  -----------------------------------
  General    |                 path: /org/freedesktop/ModemManager1/SMS/3
  -----------------------------------
  Content    |               number: {number}
             |                 text: {text}
  -----------------------------------
  Properties |                state: received
             |            timestamp: {timestamp}
"
    )
}

fn modems() -> ScriptedRunner {
    ScriptedRunner::new()
        .on("mmcli -L", CommandOutput::ok(MODEM_LIST))
        .on("mmcli -m 0", CommandOutput::ok(modem_view("ttyUSB0", "registered", 40)))
        .on("mmcli -m 1", CommandOutput::ok(modem_view("ttyUSB2", "connected", 80)))
}

fn client(runner: ScriptedRunner) -> ModemClient<ScriptedRunner> {
    ModemClient::new(runner, SmsSettings::default())
}

// ── Sending ─────────────────────────────────────────────────────────

fn send_script() -> ScriptedRunner {
    modems()
        .on(
            "mmcli -m 1 --messaging-create-sms",
            CommandOutput::ok("Successfully created new SMS: /org/freedesktop/ModemManager1/SMS/21\n"),
        )
        .on(
            "mmcli -m 0 --messaging-create-sms",
            CommandOutput::ok("Successfully created new SMS: /org/freedesktop/ModemManager1/SMS/9\n"),
        )
        .on("mmcli -s 21 --send", CommandOutput::ok("successfully sent the SMS\n"))
        .on("mmcli -s 9 --send", CommandOutput::ok("successfully sent the SMS\n"))
        .on("mmcli -m 1 --messaging-delete-sms", CommandOutput::ok(""))
        .on("mmcli -m 0 --messaging-delete-sms", CommandOutput::ok(""))
}

#[tokio::test]
async fn send_uses_best_signal_modem() {
    let sender = SmsSender::new(client(send_script()));
    let receipt = sender
        .send("+33 6 12 34 56 78", "Hello", None)
        .await
        .unwrap();

    assert!(receipt.success);
    assert_eq!(receipt.modem_id, "1");
    assert_eq!(receipt.sms_id, "21");
    assert_eq!(receipt.recipient, "+33612345678");
    assert_eq!(receipt.message_length, 5);
    assert_eq!(receipt.timestamp.len(), "2024-03-09 10:30:00".len());

    let runner = sender.client().runner();
    assert!(runner.called(
        "mmcli -m 1 --messaging-create-sms=text='Hello',number='+33612345678'"
    ));
    assert!(runner.called("mmcli -s 21 --send"));
    assert!(runner.called("mmcli -m 1 --messaging-delete-sms 21"));
}

#[tokio::test]
async fn send_on_requested_device() {
    let sender = SmsSender::new(client(send_script()));
    let receipt = sender
        .send("+33612345678", "it's here", Some("/dev/ttyUSB0"))
        .await
        .unwrap();
    assert_eq!(receipt.modem_id, "0");
    assert!(sender.client().runner().called(
        "mmcli -m 0 --messaging-create-sms=text=\"it's here\",number='+33612345678'"
    ));
}

#[tokio::test]
async fn unknown_device_is_an_error() {
    let sender = SmsSender::new(client(send_script()));
    let err = sender
        .send("+33612345678", "Hello", Some("/dev/ttyACM3"))
        .await
        .unwrap_err();
    assert!(matches!(err, SmsError::DeviceNotFound(d) if d == "/dev/ttyACM3"));
}

#[tokio::test]
async fn no_ready_modem() {
    let runner = ScriptedRunner::new()
        .on("mmcli -L", CommandOutput::ok(MODEM_LIST))
        .on("mmcli -m 0", CommandOutput::ok(modem_view("ttyUSB0", "disabled", 0)))
        .on("mmcli -m 1", CommandOutput::failed(1, "error: couldn't find modem"));
    let sender = SmsSender::new(client(runner));
    let err = sender.send("+33612345678", "Hello", None).await.unwrap_err();
    assert!(matches!(err, SmsError::NoReadyModem));
}

#[tokio::test]
async fn send_failure_deletes_the_draft() {
    let runner = send_script().on(
        "mmcli -s 21 --send",
        CommandOutput::failed(1, "error: couldn't send the SMS: 'GDBus.Error: timeout'"),
    );
    let sender = SmsSender::new(client(runner));
    let err = sender.send("+33612345678", "Hello", None).await.unwrap_err();
    assert!(matches!(err, SmsError::SendFailed(_)));
    assert!(err.to_string().contains("couldn't send"));
    assert!(sender
        .client()
        .runner()
        .called("mmcli -m 1 --messaging-delete-sms 21"));
}

#[tokio::test]
async fn create_without_id_fails() {
    let runner = send_script().on("mmcli -m 1 --messaging-create-sms", CommandOutput::ok("ok\n"));
    let sender = SmsSender::new(client(runner));
    let err = sender.send("+33612345678", "Hello", None).await.unwrap_err();
    assert!(matches!(err, SmsError::MissingSmsId));
}

#[tokio::test]
async fn discovery_failure_surfaces() {
    let runner = ScriptedRunner::new().on(
        "mmcli -L",
        CommandOutput::failed(1, "error: couldn't find the ModemManager process in the bus"),
    );
    let err = client(runner).find_modems().await.unwrap_err();
    assert!(matches!(err, SmsError::Discovery(_)));
}

#[tokio::test]
async fn list_modems_reports_details() {
    let modems = client(modems()).find_modems().await.unwrap();
    assert_eq!(modems.len(), 2);
    assert_eq!(modems[1].signal_quality, Some(80));
    assert_eq!(modems[1].operator.as_deref(), Some("Maroc Telecom"));
    let doc = serde_json::to_value(&modems).unwrap();
    assert_eq!(doc[0]["status"], "ready");
    assert_eq!(doc[0]["device_path"], "ttyUSB0");
}

// ── Receiving ───────────────────────────────────────────────────────

fn receive_script() -> ScriptedRunner {
    ScriptedRunner::new()
        .on("mmcli -L", CommandOutput::ok(MODEM_LIST))
        .on("mmcli -m 0", CommandOutput::ok(modem_view("ttyUSB0", "registered", 60)))
        .on("mmcli -m 1", CommandOutput::ok(modem_view("ttyUSB2", "disabled", 0)))
        .on(
            "mmcli -m 0 --messaging-list-sms",
            CommandOutput::ok(
                "    /org/freedesktop/ModemManager1/SMS/3 (received)\n    /org/freedesktop/ModemManager1/SMS/4 (received)\n    /org/freedesktop/ModemManager1/SMS/5 (received)\n",
            ),
        )
        .on(
            "mmcli -s 3",
            CommandOutput::ok(sms_view("+212600112233", "Salam", "2024-03-09 10:30:15")),
        )
        .on(
            "mmcli -s 4",
            CommandOutput::ok(sms_view("+212600112233", "Salam", "2024-03-09 10:30:50")),
        )
        .on("mmcli -s 5", CommandOutput::failed(1, "error: no such SMS"))
        .on("mmcli -m 0 --messaging-delete-sms", CommandOutput::ok(""))
}

fn memory_store() -> MemoryStore {
    MemoryStore::new(TimeDelta::minutes(5)).with_modem("ttyUSB0", 7)
}

#[tokio::test]
async fn cycle_stores_deduplicates_and_clears() {
    let mut receiver = SmsReceiver::new(client(receive_script()), memory_store());
    let report = receiver.run_cycle().await;
    assert_eq!(
        report,
        CycleReport::Completed {
            processed: 1,
            modems: 1,
            total_modems: 2,
        }
    );

    let rows = receiver.store().rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sender, "+212600112233");
    assert_eq!(rows[0].message, "Salam");
    assert_eq!(rows[0].modem_id, Some(7));
    assert_eq!(
        rows[0].received_at,
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(10, 30, 15)
            .unwrap()
    );

    let runner = receiver.client().runner();
    assert!(runner.called("mmcli -m 0 --messaging-delete-sms 3"));
    // The duplicate is cleared from the modem too.
    assert!(runner.called("mmcli -m 0 --messaging-delete-sms 4"));
    assert!(!runner.called("mmcli -m 0 --messaging-delete-sms 5"));
    // Modems that are not ready are never listed.
    assert!(!runner.called("mmcli -m 1 --messaging-list-sms"));
}

#[tokio::test]
async fn handled_sms_are_not_read_again() {
    let mut receiver = SmsReceiver::new(client(receive_script()), memory_store());
    receiver.run_cycle().await;
    let reads_before = receiver
        .client()
        .runner()
        .calls()
        .iter()
        .filter(|c| *c == "mmcli -s 3")
        .count();

    let report = receiver.run_cycle().await;
    assert!(report.is_success());
    let calls = receiver.client().runner().calls();
    assert_eq!(calls.iter().filter(|c| *c == "mmcli -s 3").count(), reads_before);
    // The unreadable one is retried.
    assert_eq!(calls.iter().filter(|c| *c == "mmcli -s 5").count(), 2);
}

struct FailingStore;

#[async_trait]
impl ReceivedSmsStore for FailingStore {
    async fn modem_id_by_device(&self, _device_path: &str) -> Result<Option<i64>, ReceiveError> {
        Err(ReceiveError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn store(&self, _sms: &NewReceivedSms) -> Result<StoreOutcome, ReceiveError> {
        Err(ReceiveError::Database(sqlx::Error::PoolTimedOut))
    }
}

#[tokio::test]
async fn store_failure_keeps_sms_on_modem() {
    let mut receiver = SmsReceiver::new(client(receive_script()), FailingStore);
    let report = receiver.run_cycle().await;
    assert_eq!(
        report,
        CycleReport::Completed {
            processed: 0,
            modems: 1,
            total_modems: 2,
        }
    );
    assert!(!receiver
        .client()
        .runner()
        .called("mmcli -m 0 --messaging-delete-sms"));

    // Nothing was marked handled, so the next cycle tries again.
    receiver.run_cycle().await;
    let reads = receiver
        .client()
        .runner()
        .calls()
        .iter()
        .filter(|c| *c == "mmcli -s 3")
        .count();
    assert_eq!(reads, 2);
}

#[tokio::test]
async fn cycle_without_modems() {
    let runner = ScriptedRunner::new().on("mmcli -L", CommandOutput::ok("No modems were found\n"));
    let mut receiver = SmsReceiver::new(client(runner), memory_store());
    let report = receiver.run_cycle().await;
    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        serde_json::json!({"success": true, "processed": 0, "modems": 0, "total_modems": 0})
    );
}

#[tokio::test]
async fn cycle_reports_discovery_failure() {
    let runner = ScriptedRunner::new().on_timeout("mmcli -L");
    let mut receiver = SmsReceiver::new(client(runner), memory_store());
    match receiver.run_cycle().await {
        CycleReport::Failed { error } => assert!(error.contains("timeout")),
        other => panic!("unexpected report {other:?}"),
    }
}

#[tokio::test]
async fn modems_without_primary_port_are_ignored() {
    let runner = ScriptedRunner::new()
        .on("mmcli -L", CommandOutput::ok(MODEM_LIST))
        .on("mmcli -m 0", CommandOutput::ok(modem_view("ttyUSB0", "registered", 60)))
        .on("mmcli -m 1", CommandOutput::ok("  Status |   state: registered\n"));
    let receiver = SmsReceiver::new(client(runner), memory_store());
    let modems = receiver.find_modems().await.unwrap();
    assert_eq!(modems.len(), 1);
    assert_eq!(modems[0].id, "0");
}

#[tokio::test]
async fn daemon_runs_until_shutdown() {
    let mut receiver = SmsReceiver::new(client(receive_script()), memory_store());
    receiver
        .run_daemon(
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await;

    let cycles = receiver
        .client()
        .runner()
        .calls()
        .iter()
        .filter(|c| *c == "mmcli -L")
        .count();
    assert!(cycles >= 2, "only {cycles} cycles ran");
    assert_eq!(receiver.store().rows().len(), 1);
}
