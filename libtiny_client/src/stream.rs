use lazy_static::lazy_static;
use std::{
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::TcpStream,
};

use crate::SASLExternal;

#[cfg(feature = "tls-native")]
use tokio_native_tls::TlsStream;
#[cfg(feature = "tls-rustls")]
use tokio_rustls::client::TlsStream;

#[cfg(feature = "tls-native")]
lazy_static! {
    static ref TLS_CONNECTOR: tokio_native_tls::TlsConnector =
        tokio_native_tls::TlsConnector::from(native_tls::TlsConnector::builder().build().unwrap());
}

#[cfg(feature = "tls-rustls")]
fn root_store() -> tokio_rustls::rustls::RootCertStore {
    let mut root_store = tokio_rustls::rustls::RootCertStore::empty();
    root_store.extend(rustls_native_certs::load_native_certs().certs);
    root_store
}

#[cfg(feature = "tls-rustls")]
lazy_static! {
    static ref TLS_CONNECTOR: tokio_rustls::TlsConnector = {
        let config = tokio_rustls::rustls::ClientConfig::builder()
            .with_root_certificates(root_store())
            .with_no_client_auth();
        tokio_rustls::TlsConnector::from(Arc::new(config))
    };
}

#[derive(Debug)]
// Boxed to keep `Stream`'s size small and uniform between the native-tls and
// rustls backends; see osa1/tiny#189.
pub(crate) enum Stream {
    TcpStream(Box<TcpStream>),
    TlsStream(Box<TlsStream<TcpStream>>),
}

#[cfg(feature = "tls-native")]
pub(crate) type TlsError = native_tls::Error;
#[cfg(feature = "tls-rustls")]
pub(crate) type TlsError = tokio_rustls::rustls::Error;

pub(crate) enum StreamError {
    TlsError(TlsError),
    IoError(std::io::Error),
}

impl From<TlsError> for StreamError {
    fn from(err: TlsError) -> Self {
        StreamError::TlsError(err)
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::IoError(err)
    }
}

impl Stream {
    pub(crate) async fn new_tcp(addr: SocketAddr) -> Result<Stream, StreamError> {
        Ok(Stream::TcpStream(TcpStream::connect(addr).await?.into()))
    }

    /// `client_cert` is `Some` only for SASL EXTERNAL: the server identifies
    /// us from this certificate during the handshake rather than from an
    /// `AUTHENTICATE` payload. `tls-native` has no client-certificate API in
    /// this crate's current dependency set, so it's accepted but ignored
    /// there; SASL EXTERNAL is only wired up for `tls-rustls`.
    #[cfg(feature = "tls-native")]
    pub(crate) async fn new_tls(
        addr: SocketAddr,
        host_name: &str,
        _client_cert: Option<&SASLExternal>,
    ) -> Result<Stream, StreamError> {
        let tcp_stream = TcpStream::connect(addr).await?;
        let tls_stream = TLS_CONNECTOR.connect(host_name, tcp_stream).await?;
        Ok(Stream::TlsStream(tls_stream.into()))
    }

    #[cfg(feature = "tls-rustls")]
    pub(crate) async fn new_tls(
        addr: SocketAddr,
        host_name: &str,
        client_cert: Option<&SASLExternal>,
    ) -> Result<Stream, StreamError> {
        let tcp_stream = TcpStream::connect(addr).await?;
        let name = tokio_rustls::rustls::pki_types::ServerName::try_from(host_name.to_owned())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        let tls_stream = match client_cert {
            None => TLS_CONNECTOR
                .connect(name, tcp_stream)
                .await
                .map_err(StreamError::from)?,
            Some(SASLExternal { cert, key }) => {
                use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

                let cert = CertificateDer::from(cert.clone());
                let key = PrivateKeyDer::try_from(key.clone())
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
                let config = tokio_rustls::rustls::ClientConfig::builder()
                    .with_root_certificates(root_store())
                    .with_client_auth_cert(vec![cert], key)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
                let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
                connector
                    .connect(name, tcp_stream)
                    .await
                    .map_err(StreamError::from)?
            }
        };
        Ok(Stream::TlsStream(tls_stream.into()))
    }
}

//
// Boilerplate
//

impl AsyncRead for Stream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut ReadBuf,
    ) -> Poll<Result<(), std::io::Error>> {
        match *self {
            Stream::TcpStream(ref mut tcp_stream) => Pin::new(tcp_stream).poll_read(cx, buf),
            Stream::TlsStream(ref mut tls_stream) => Pin::new(tls_stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        match *self {
            Stream::TcpStream(ref mut tcp_stream) => Pin::new(tcp_stream).poll_write(cx, buf),
            Stream::TlsStream(ref mut tls_stream) => Pin::new(tls_stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Result<(), std::io::Error>> {
        match *self {
            Stream::TcpStream(ref mut tcp_stream) => Pin::new(tcp_stream).poll_flush(cx),
            Stream::TlsStream(ref mut tls_stream) => Pin::new(tls_stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context,
    ) -> Poll<Result<(), std::io::Error>> {
        match *self {
            Stream::TcpStream(ref mut tcp_stream) => Pin::new(tcp_stream).poll_shutdown(cx),
            Stream::TlsStream(ref mut tls_stream) => Pin::new(tls_stream).poll_shutdown(cx),
        }
    }
}
