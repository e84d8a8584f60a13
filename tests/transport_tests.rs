//! Integration tests for the transport connection over a mock port.
//!
//! Covers exact-length reads, fault classification, and the connection
//! state/last-error bookkeeping that every operation performs.

mod common;

use common::{enqueue_chunked, mock_transport, response_bytes, STATUS_REQUEST, STATUS_RESPONSE_LEN};
use serial_transport::port::{OpenStep, ReadStep, WriteStep};
use serial_transport::{ConnectionState, Phase, StateChange, TransportError};
use std::io;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Exact-length exchanges
// ============================================================================

mod exchange_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_status_request_round_trip() {
        let (mut transport, mut port) = mock_transport("/dev/ttyACM0");
        let response = response_bytes(STATUS_RESPONSE_LEN);
        port.enqueue_read(&response);

        let cancel = CancellationToken::new();
        transport.write(&STATUS_REQUEST, &cancel).await.unwrap();
        let received = transport.read(STATUS_RESPONSE_LEN, &cancel).await.unwrap();

        assert_eq!(received, response);
        assert_eq!(port.written(), STATUS_REQUEST.to_vec());
        assert_eq!(transport.state(), ConnectionState::Connected);
        assert!(transport.last_error().is_none());
    }

    #[tokio::test]
    async fn test_write_and_read_preserves_chunk_order() {
        let (mut transport, mut port) = mock_transport("MOCK0");
        let response = response_bytes(STATUS_RESPONSE_LEN);
        enqueue_chunked(&mut port, &response, &[1, 10, 3, 15]);

        let received = transport
            .write_and_read(&STATUS_REQUEST, STATUS_RESPONSE_LEN, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(received, response);
        assert_eq!(port.calls().read_some, 4);
    }

    #[tokio::test]
    async fn test_zero_length_read_issues_no_read_call() {
        let (mut transport, port) = mock_transport("MOCK0");

        let received = transport.read(0, &CancellationToken::new()).await.unwrap();
        assert!(received.is_empty());
        assert_eq!(port.calls().read_some, 0);
        assert_eq!(transport.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_write_and_read_zero_length_only_writes() {
        let (mut transport, port) = mock_transport("MOCK0");

        let received = transport
            .write_and_read(&STATUS_REQUEST, 0, &CancellationToken::new())
            .await
            .unwrap();

        assert!(received.is_empty());
        assert_eq!(port.written(), STATUS_REQUEST.to_vec());
        assert_eq!(port.calls().read_some, 0);
    }

    #[tokio::test]
    async fn test_write_handles_partial_acceptance() {
        let (mut transport, mut port) = mock_transport("MOCK0");
        port.push_write(WriteStep::Accept(2));
        port.push_write(WriteStep::Accept(2));

        transport
            .write(&STATUS_REQUEST, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            port.get_write_log(),
            vec![vec![0x02, 0x01], vec![0x00, 0x5A], vec![0x04]]
        );
    }
}

// ============================================================================
// Fault classification
// ============================================================================

mod fault_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_end_of_stream_is_incomplete_transfer() {
        let (mut transport, mut port) = mock_transport("COM1");
        port.enqueue_read(&response_bytes(10));
        port.push_read(ReadStep::Eof);

        let err = transport
            .read(STATUS_RESPONSE_LEN, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TransportError::IncompleteTransfer {
                port: "COM1".into(),
                expected: 29,
                received: 10,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_is_read_timeout() {
        let (mut transport, mut port) = mock_transport("COM1");
        port.enqueue_read(&response_bytes(10));
        port.push_read(ReadStep::Silence);

        let err = transport
            .read(STATUS_RESPONSE_LEN, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::ReadTimeout { .. }));
        assert_eq!(err.timeout(), Some(Duration::from_millis(500)));
        assert_eq!(err.port_name(), Some("COM1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_chunks_share_one_budget() {
        let (mut transport, mut port) = mock_transport("COM1");
        port.push_read(ReadStep::Delayed(Duration::from_millis(300), vec![1, 2]));
        port.push_read(ReadStep::Delayed(Duration::from_millis(300), vec![3, 4]));
        port.push_read(ReadStep::Data(vec![5, 6]));

        let err = transport
            .read(6, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(port.calls().read_some, 2);
    }

    #[tokio::test]
    async fn test_overrun_is_fatal() {
        let (mut transport, mut port) = mock_transport("COM1");
        port.push_read(ReadStep::Oversized(response_bytes(8)));

        let err = transport
            .read(4, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransportError::TransferOverrun {
                expected: 4,
                received: 8,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_busy_port_on_open() {
        let (mut transport, mut port) = mock_transport("COM3");
        port.push_open(OpenStep::Busy);

        let err = transport
            .write(&STATUS_REQUEST, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::PortBusy { ref port, .. } if port == "COM3"));
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(transport.last_error(), Some(err.clone()));
        assert_eq!(port.calls().write, 0);
    }

    #[tokio::test]
    async fn test_missing_device_is_connect_fault() {
        let (mut transport, mut port) = mock_transport("COM9");
        port.push_open(OpenStep::NotFound);

        let err = transport.read(1, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert_eq!(err.phase(), Some(Phase::Open));
    }

    #[tokio::test]
    async fn test_zero_progress_write_is_write_fault() {
        let (mut transport, mut port) = mock_transport("COM1");
        port.push_write(WriteStep::Accept(3));
        port.push_write(WriteStep::Accept(0));

        let err = transport
            .write_and_read(&STATUS_REQUEST, STATUS_RESPONSE_LEN, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::WriteTransportFault { .. }));
        assert_eq!(port.calls().read_some, 0);
    }

    #[tokio::test]
    async fn test_platform_write_timeout() {
        let (mut transport, mut port) = mock_transport("COM1");
        port.push_write(WriteStep::Fail(io::ErrorKind::TimedOut));

        let err = transport
            .write(&STATUS_REQUEST, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::WriteTimeout { .. }));
        assert_eq!(err.timeout(), Some(Duration::from_millis(500)));
    }

    #[tokio::test]
    async fn test_read_io_failure_is_read_fault() {
        let (mut transport, mut port) = mock_transport("COM1");
        port.push_read(ReadStep::Fail(io::ErrorKind::BrokenPipe));

        let err = transport.read(4, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::ReadTransportFault { .. }));
        assert!(err.is_transport_fault());
    }
}

// ============================================================================
// Connection state and last error
// ============================================================================

mod state_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_fault_then_recovery() {
        let (mut transport, mut port) = mock_transport("COM1");
        let mut changes = transport.subscribe();
        port.push_read(ReadStep::Eof);

        let err = transport.read(4, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(transport.last_error(), Some(err.clone()));

        port.enqueue_read(&[1, 2, 3, 4]);
        let data = transport.read(4, &CancellationToken::new()).await.unwrap();
        assert_eq!(data, vec![1, 2, 3, 4]);
        assert_eq!(transport.state(), ConnectionState::Connected);
        assert!(transport.last_error().is_none());

        let connected = StateChange {
            old_state: ConnectionState::Disconnected,
            new_state: ConnectionState::Connected,
        };
        let disconnected = StateChange {
            old_state: ConnectionState::Connected,
            new_state: ConnectionState::Disconnected,
        };
        assert_eq!(changes.try_recv().unwrap(), connected);
        assert_eq!(changes.try_recv().unwrap(), disconnected);
        assert_eq!(changes.try_recv().unwrap(), connected);
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_repeated_open_failures_update_last_error() {
        let (mut transport, mut port) = mock_transport("COM3");
        let mut changes = transport.subscribe();
        let mut errors = transport.subscribe_errors();
        port.push_open(OpenStep::Busy);
        port.push_open(OpenStep::Fail(io::ErrorKind::Other));

        let first = transport.read(1, &CancellationToken::new()).await.unwrap_err();
        let second = transport.read(1, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(first, TransportError::PortBusy { .. }));
        assert!(matches!(second, TransportError::Connect { .. }));
        assert_eq!(transport.last_error(), Some(second.clone()));
        assert!(changes.try_recv().is_err());
        assert_eq!(errors.try_recv().unwrap(), first);
        assert_eq!(errors.try_recv().unwrap(), second);
    }

    #[tokio::test]
    async fn test_disconnect_when_already_down() {
        let (mut transport, port) = mock_transport("COM1");
        let mut changes = transport.subscribe();

        transport.disconnect(None);
        assert!(changes.try_recv().is_err());

        let cause = TransportError::invalid_request("caller gave up");
        transport.disconnect(Some(cause.clone()));
        assert!(changes.try_recv().is_err());
        assert_eq!(transport.last_error(), Some(cause.clone()));
        assert_eq!(port.calls().close, 0);
    }

    #[tokio::test]
    async fn test_disconnect_closes_open_port() {
        let (mut transport, port) = mock_transport("COM1");
        transport
            .write(&STATUS_REQUEST, &CancellationToken::new())
            .await
            .unwrap();

        transport.disconnect(None);
        transport.disconnect(None);

        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert!(transport.last_error().is_none());
        assert_eq!(port.calls().close, 1);

        drop(transport);
        assert_eq!(port.calls().close, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_read_disconnects() {
        let (mut transport, mut port) = mock_transport("COM1");
        port.push_read(ReadStep::Delayed(Duration::from_millis(5), vec![1]));
        port.enqueue_read(&[2]);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            trigger.cancel();
        });

        let err = transport.read(2, &cancel).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::OperationCancelled {
                phase: Phase::Read,
                ..
            }
        ));
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(transport.last_error(), Some(err.clone()));
        assert_eq!(port.calls().read_some, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_between_partial_writes_disconnects() {
        let (mut transport, mut port) = mock_transport("COM1");
        port.push_write(WriteStep::Delayed(Duration::from_millis(5), 2));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            trigger.cancel();
        });

        let err = transport
            .write_and_read(&STATUS_REQUEST, STATUS_RESPONSE_LEN, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::OperationCancelled {
                phase: Phase::Write,
                ..
            }
        ));
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(transport.last_error(), Some(err.clone()));
        assert_eq!(port.written(), STATUS_REQUEST[..2].to_vec());
        assert_eq!(port.calls().write, 1);
        assert_eq!(port.calls().read_some, 0);
    }
}

// ============================================================================
// Properties
// ============================================================================

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_successful_read_returns_exact_length(
            len in 0usize..512,
            sizes in proptest::collection::vec(1usize..64, 0..16),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let (mut transport, mut port) = mock_transport("PROP0");
                let response = response_bytes(len);
                enqueue_chunked(&mut port, &response, &sizes);

                let received = transport.read(len, &CancellationToken::new()).await.unwrap();
                prop_assert_eq!(received, response);
                Ok(())
            })?;
        }

        #[test]
        fn prop_short_stream_reports_counts(
            len in 2usize..256,
            cut in 1usize..255,
        ) {
            let received_len = cut.min(len - 1);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let (mut transport, mut port) = mock_transport("PROP0");
                port.enqueue_read(&response_bytes(received_len));
                port.push_read(ReadStep::Eof);

                let err = transport.read(len, &CancellationToken::new()).await.unwrap_err();
                let is_incomplete = matches!(
                    err,
                    TransportError::IncompleteTransfer { expected, received, .. }
                        if expected == len && received == received_len
                );
                prop_assert!(is_incomplete);
                prop_assert_eq!(transport.state(), ConnectionState::Disconnected);
                Ok(())
            })?;
        }
    }
}
