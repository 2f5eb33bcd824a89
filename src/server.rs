//! 서버 루프
//!
//! `대기 -> 메시지 1개 수신 -> 처리 -> 응답 1개 송신 -> (TCP) 연결 종료`
//! 주기 사이에 남는 상태는 없다. 한 주기의 실패는 로그만 남기고 다음 주기로 넘어간다.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::message::MessageType;
use crate::service::{FileInspector, RangeHasher, RangeReader};
use crate::transport::{DatagramTransport, StreamTransport, Transport};
use crate::{Config, Result};

/// RFI 서버
pub struct Server<S> {
    config: Config,
    dispatcher: Dispatcher<S>,
}

impl<S> Server<S>
where
    S: FileInspector + RangeHasher + RangeReader,
{
    pub fn new(service: S, config: Config) -> Self {
        let config = config.normalized();
        Self {
            dispatcher: Dispatcher::new(service, &config),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher<S> {
        &self.dispatcher
    }

    /// 요청 1개 처리
    pub async fn serve_one<T>(&self, transport: &mut T) -> Result<MessageType>
    where
        T: Transport + ?Sized,
    {
        let message = transport.receive_message().await?;
        debug!(
            "메시지 수신 ({}): type=0x{:02x}, length={}",
            transport.kind(),
            message.msg_type,
            message.payload.len()
        );
        self.dispatcher.handle(transport, &message).await
    }

    /// TCP: 연결마다 요청 1개 처리 후 종료
    pub async fn serve_stream(&self, listener: TcpListener) -> Result<()> {
        info!("TCP 서버 대기 중: {}", listener.local_addr()?);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("accept 실패: {}", e);
                    continue;
                }
            };
            debug!("연결 수락: {}", peer);

            let mut transport = StreamTransport::from_stream(stream, &self.config);
            match self.serve_one(&mut transport).await {
                Ok(kind) => debug!("응답 완료 ({}): {}", peer, kind.label()),
                Err(e) => warn!("요청 처리 실패 ({}): {}", peer, e),
            }

            if let Err(e) = transport.close().await {
                debug!("연결 종료 에러 ({}): {}", peer, e);
            }
        }
    }

    /// UDP: 데이터그램 1개 = 요청 1개
    pub async fn serve_datagram(&self, transport: &mut DatagramTransport) -> Result<()> {
        info!("UDP 서버 대기 중: {}", transport.local_addr()?);

        loop {
            match self.serve_one(transport).await {
                Ok(kind) => {
                    debug!("응답 완료: {}", kind.label());
                    if let Some(stats) = transport.stats() {
                        debug!("{}", stats.summary());
                    }
                }
                Err(e) => warn!("요청 처리 실패: {}", e),
            }
        }
    }

    /// 바인드 후 서버 실행
    ///
    /// `shutdown_after`가 설정되어 있으면 시작 시점부터 그 시간이 지나면 종료한다.
    /// 요청 처리로 타이머가 연장되지 않는다.
    pub async fn run(&self, bind_addr: SocketAddr, udp: bool) -> Result<()> {
        let serve = async {
            if udp {
                let mut transport = DatagramTransport::server(&self.config, bind_addr).await?;
                self.serve_datagram(&mut transport).await
            } else {
                let listener = TcpListener::bind(bind_addr).await?;
                self.serve_stream(listener).await
            }
        };

        match self.config.shutdown_after {
            Some(after) => {
                tokio::select! {
                    result = serve => result,
                    _ = tokio::time::sleep(after) => {
                        info!("{}초 경과, 서버 종료", after.as_secs());
                        Ok(())
                    }
                }
            }
            None => serve.await,
        }
    }
}
