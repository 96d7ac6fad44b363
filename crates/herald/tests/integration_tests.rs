use herald::*;
use serial_test::serial;

#[test]
#[serial]
fn test_level_functions_do_not_panic() {
  info("user alice processed");
  warn("user bob skipped");
  error("artifact store unavailable");
  success("batch complete");
  debug("prompt length 812");
  verbose("rag context 2 chunks");
}

#[test]
#[serial]
fn test_multiline_messages() {
  let multiline = "first line\nsecond line\nthird line";
  info(multiline);
  warn(multiline);
  error(multiline);
  event_info(multiline);
  event_error(multiline);
}

#[test]
#[serial]
fn test_verbose_toggle() {
  set_verbose(true);
  assert!(is_verbose());
  debug("visible in verbose mode");
  set_verbose(false);
  assert!(!is_verbose());
}

#[test]
#[serial]
fn test_quiet_toggle() {
  set_quiet(true);
  assert!(is_quiet());
  info("suppressed");
  announce("suppressed banner");
  set_quiet(false);
  assert!(!is_quiet());
}

#[test]
#[serial]
fn test_macros_expand() {
  herald::info!("macro info");
  herald::warn!(&format!("macro warn {}", 2));
  herald::flourish!("summary");
  herald::event_success!("done");
}

#[test]
#[serial]
fn test_init_tracing_twice_is_harmless() {
  init_tracing(false);
  init_tracing(true);
  assert!(is_verbose());
  set_verbose(false);
}
