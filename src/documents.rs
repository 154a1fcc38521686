//! Wowza application configuration documents.
//!
//! Pure text generation. The descriptor layout is what Wowza Streaming Engine
//! 4.8 parses, so the whitespace and property order are kept exactly as is.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::models::AccountConfig;

pub const APPLICATION_XML: &str = "Application.xml";
pub const PUBLISH_PASSWORD: &str = "publish.password";
pub const ALIAS_MAP_PLAY: &str = "aliasmap.play.txt";
pub const ALIAS_MAP_STREAM: &str = "aliasmap.stream.txt";

/// Properties that both carry the publish bitrate cap.
pub const BITRATE_PROPERTIES: [&str; 2] = ["limitPublishedStreamBandwidthMaxBitrate", "MaxBitrate"];
/// Properties that both carry the viewer cap.
pub const VIEWER_PROPERTIES: [&str; 2] = ["limitStreamViewersMaxViewers", "securityPlayMaximumConnections"];

static PROPERTY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<Name>([^<]*)</Name>(\s*)<Value>[^<]*</Value>").expect("valid pattern")
});

/// Remote locations for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountPaths {
    pub app_dir: String,
    pub storage_dir: String,
}

impl AccountPaths {
    pub fn new(config_root: &str, storage_root: &str, name: &str) -> Self {
        Self {
            app_dir: join(config_root, name),
            storage_dir: join(storage_root, name),
        }
    }

    pub fn file(&self, file_name: &str) -> String {
        join(&self.app_dir, file_name)
    }

    pub fn descriptor(&self) -> String {
        self.file(APPLICATION_XML)
    }

    pub fn password_file(&self) -> String {
        self.file(PUBLISH_PASSWORD)
    }

    /// Backup locations are siblings of the application directory.
    pub fn backup_dir(&self, stamp_millis: i64) -> String {
        format!("{}_backup_{}", self.app_dir, stamp_millis)
    }
}

pub(crate) fn join(base: &str, segment: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), segment)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: String,
    pub content: String,
}

/// The four files that make up an account's application directory.
#[derive(Debug, Clone)]
pub struct ConfigurationBundle {
    pub documents: Vec<Document>,
}

impl ConfigurationBundle {
    pub fn generate(account: &AccountConfig, paths: &AccountPaths, storage_root: &str) -> Self {
        let name = account.name.as_str();
        let documents = vec![
            Document {
                path: paths.file(APPLICATION_XML),
                content: application_descriptor(
                    name,
                    &account.host,
                    account.max_bitrate_kbps,
                    account.max_viewers,
                    storage_root,
                ),
            },
            Document {
                path: paths.file(PUBLISH_PASSWORD),
                content: publish_password(name, &account.publish_secret),
            },
            Document {
                path: paths.file(ALIAS_MAP_PLAY),
                content: alias_map(name),
            },
            Document {
                path: paths.file(ALIAS_MAP_STREAM),
                content: alias_map(name),
            },
        ];
        Self { documents }
    }
}

/// `<name>=<secret>` followed by the wildcard fallback line.
pub fn publish_password(name: &str, secret: &str) -> String {
    format!("{name}={secret}\n*=${{Stream.Name}}")
}

/// Used for both the play and the stream alias map.
pub fn alias_map(name: &str) -> String {
    format!("{name} {name}")
}

/// Rewrites the `<Value>` of every `<Property>` called `property`.
///
/// Returns the patched document and how many values were replaced. A zero
/// count means the descriptor layout no longer matches what this function
/// expects.
pub fn patch_property(document: &str, property: &str, value: &str) -> (String, usize) {
    let mut replaced = 0;
    let patched = PROPERTY_VALUE.replace_all(document, |caps: &Captures| {
        if &caps[1] == property {
            replaced += 1;
            format!("<Name>{}</Name>{}<Value>{}</Value>", &caps[1], &caps[2], value)
        } else {
            caps[0].to_string()
        }
    });
    (patched.into_owned(), replaced)
}

pub fn application_descriptor(
    name: &str,
    host: &str,
    bitrate: u32,
    viewers: u32,
    storage_root: &str,
) -> String {
    let storage_root = storage_root.trim_end_matches('/');
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Root version="1">
	<Application>
		<Name>{name}</Name>
		<AppType>Live</AppType>
		<Description>Streaming application provisioned automatically for {name}</Description>
		<Connections>
			<AutoAccept>true</AutoAccept>
			<AllowDomains></AllowDomains>
		</Connections>
		<Streams>
			<StreamType>live</StreamType>
			<StorageDir>{storage_root}/{name}</StorageDir>
			<KeyDir>${{com.wowza.wms.context.VHostConfigHome}}/keys</KeyDir>
			<LiveStreamPacketizers>cupertinostreamingpacketizer, mpegdashstreamingpacketizer, sanjosestreamingpacketizer, smoothstreamingpacketizer</LiveStreamPacketizers>
			<Properties>
			</Properties>
		</Streams>
		<Transcoder>
			<LiveStreamTranscoder></LiveStreamTranscoder>
			<Templates>${{SourceStreamName}}.xml,transrate.xml</Templates>
			<ProfileDir>${{com.wowza.wms.context.VHostConfigHome}}/transcoder/profiles</ProfileDir>
			<TemplateDir>${{com.wowza.wms.context.VHostConfigHome}}/transcoder/templates</TemplateDir>
			<Properties>
			</Properties>
		</Transcoder>
		<DVR>
			<Recorders></Recorders>
			<Store></Store>
			<WindowDuration>0</WindowDuration>
			<StorageDir>${{com.wowza.wms.context.VHostConfigHome}}/dvr</StorageDir>
			<ArchiveStrategy>append</ArchiveStrategy>
			<Properties>
			</Properties>
		</DVR>
		<TimedText>
			<VODTimedTextProviders></VODTimedTextProviders>
			<Properties>
			</Properties>
		</TimedText>
		<HTTPStreamers>cupertinostreaming, smoothstreaming, sanjosestreaming, mpegdashstreaming</HTTPStreamers>
		<MediaCache>
			<MediaCacheSourceList></MediaCacheSourceList>
		</MediaCache>
		<SharedObjects>
			<StorageDir>${{com.wowza.wms.context.VHostConfigHome}}/applications/${{com.wowza.wms.context.Application}}/sharedobjects/${{com.wowza.wms.context.ApplicationInstance}}</StorageDir>
		</SharedObjects>
		<Client>
			<IdleFrequency>-1</IdleFrequency>
			<Access>
				<StreamReadAccess>*</StreamReadAccess>
				<StreamWriteAccess>*</StreamWriteAccess>
				<StreamAudioSampleAccess></StreamAudioSampleAccess>
				<StreamVideoSampleAccess></StreamVideoSampleAccess>
				<SharedObjectReadAccess>*</SharedObjectReadAccess>
				<SharedObjectWriteAccess>*</SharedObjectWriteAccess>
			</Access>
		</Client>
		<RTP>
			<Authentication>
				<PublishMethod>digest</PublishMethod>
				<PlayMethod>none</PlayMethod>
			</Authentication>
			<AVSyncMethod>senderreport</AVSyncMethod>
			<MaxRTCPWaitTime>12000</MaxRTCPWaitTime>
			<IdleFrequency>75</IdleFrequency>
			<RTSPSessionTimeout>90000</RTSPSessionTimeout>
			<RTSPMaximumPendingWriteBytes>0</RTSPMaximumPendingWriteBytes>
			<RTSPBindIpAddress></RTSPBindIpAddress>
			<RTSPConnectionIpAddress>0.0.0.0</RTSPConnectionIpAddress>
			<RTSPOriginIpAddress>127.0.0.1</RTSPOriginIpAddress>
			<IncomingDatagramPortRanges>*</IncomingDatagramPortRanges>
			<Properties>
			</Properties>
		</RTP>
		<WebRTC>
			<EnablePublish>true</EnablePublish>
			<EnablePlay>true</EnablePlay>
			<EnableQuery>true</EnableQuery>
			<IceCandidateIpAddresses>{host},tcp,1935</IceCandidateIpAddresses>
			<UDPBindAddress></UDPBindAddress>
			<PreferredCodecsAudio>opus,vorbis,pcmu,pcma</PreferredCodecsAudio>
			<PreferredCodecsVideo>vp8,h264</PreferredCodecsVideo>
			<DebugLog>false</DebugLog>
			<Properties>
			</Properties>
		</WebRTC>
		<MediaCaster>
			<RTP>
				<RTSP>
					<RTPTransportMode>interleave</RTPTransportMode>
				</RTSP>
			</RTP>
			<StreamValidator>
				<Enable>true</Enable>
				<ResetNameGroups>true</ResetNameGroups>
				<StreamStartTimeout>20000</StreamStartTimeout>
				<StreamTimeout>12000</StreamTimeout>
				<VideoStartTimeout>0</VideoStartTimeout>
				<VideoTimeout>0</VideoTimeout>
				<AudioStartTimeout>0</AudioStartTimeout>
				<AudioTimeout>0</AudioTimeout>
				<VideoTCToleranceEnable>false</VideoTCToleranceEnable>
				<VideoTCPosTolerance>3000</VideoTCPosTolerance>
				<VideoTCNegTolerance>-500</VideoTCNegTolerance>
				<AudioTCToleranceEnable>false</AudioTCToleranceEnable>
				<AudioTCPosTolerance>3000</AudioTCPosTolerance>
				<AudioTCNegTolerance>-500</AudioTCNegTolerance>
				<DataTCToleranceEnable>false</DataTCToleranceEnable>
				<DataTCPosTolerance>3000</DataTCPosTolerance>
				<DataTCNegTolerance>-500</DataTCNegTolerance>
				<AVSyncToleranceEnable>false</AVSyncToleranceEnable>
				<AVSyncTolerance>1500</AVSyncTolerance>
				<DebugLog>false</DebugLog>
			</StreamValidator>
			<Properties>
			</Properties>
		</MediaCaster>
		<MediaReader>
			<Properties>
			</Properties>
		</MediaReader>
		<MediaWriter>
			<Properties>
			</Properties>
		</MediaWriter>
		<LiveStreamPacketizer>
			<Properties>
			</Properties>
		</LiveStreamPacketizer>
		<HTTPStreamer>
			<Properties>
                <Property>
                <Name>cupertinoPlaylistProgramId</Name>
                <Value>1</Value>
                <Type>Integer</Type>
                </Property>
			</Properties>
		</HTTPStreamer>
		<HTTPProvider>
			<BaseClass>com.wowza.wms.plugin.HTTPStreamControl</BaseClass>
			<RequestFilters>streamcontrol*</RequestFilters>
			<AuthenticationMethod>none</AuthenticationMethod>
		</HTTPProvider>
		<Manager>
			<Properties>
			</Properties>
		</Manager>
		<Repeater>
			<OriginURL></OriginURL>
			<QueryString><![CDATA[]]></QueryString>
		</Repeater>
		<StreamRecorder>
			<Properties>
			</Properties>
		</StreamRecorder>
		<Modules>
			<Module>
				<Name>base</Name>
				<Description>Base</Description>
				<Class>com.wowza.wms.module.ModuleCore</Class>
			</Module>
			<Module>
				<Name>logging</Name>
				<Description>Client Logging</Description>
				<Class>com.wowza.wms.module.ModuleClientLogging</Class>
			</Module>
			<Module>
				<Name>flvplayback</Name>
				<Description>FLVPlayback</Description>
				<Class>com.wowza.wms.module.ModuleFLVPlayback</Class>
			</Module>
			<Module>
				<Name>ModuleCoreSecurity</Name>
				<Description>Core Security Module for Applications</Description>
				<Class>com.wowza.wms.security.ModuleCoreSecurity</Class>
			</Module>
			<Module>
				<Name>streamPublisher</Name>
				<Description>Playlists</Description>
				<Class>com.wowza.wms.plugin.streampublisher.ModuleStreamPublisher</Class>
			</Module>
           <Module>
				<Name>ModuleLoopUntilLive</Name>
				<Description>ModuleLoopUntilLive</Description>
				<Class>com.wowza.wms.plugin.streampublisher.ModuleLoopUntilLive</Class>
			</Module>
			<Module>
                <Name>ModuleLimitPublishedStreamBandwidth</Name>
                <Description>Monitors limit of published stream bandwidth.</Description>
                <Class>com.wowza.wms.plugin.ModuleLimitPublishedStreamBandwidth</Class>
            </Module>
			<Module>
                    <Name>ModulePushPublish</Name>
                    <Description>ModulePushPublish</Description>
                    <Class>com.wowza.wms.pushpublish.module.ModulePushPublish</Class>
            </Module>
		</Modules>
		<Properties>
			<Property>
				<Name>limitPublishedStreamBandwidthMaxBitrate</Name>
				<Value>{bitrate}</Value>
				<Type>Integer</Type>
			</Property>
			<Property>
				<Name>limitPublishedStreamBandwidthDebugLog</Name>
				<Value>true</Value>
				<Type>Boolean</Type>
			</Property>
			<Property>
				<Name>MaxBitrate</Name>
				<Value>{bitrate}</Value>
				<Type>Integer</Type>
			</Property>
			<Property>
				<Name>StreamMonitorLogging</Name>
				<Value>true</Value>
				<Type>Boolean</Type>
			</Property>
			<Property>
				<Name>limitStreamViewersMaxViewers</Name>
				<Value>{viewers}</Value>
				<Type>Integer</Type>
			</Property>
			<Property>
				<Name>securityPlayMaximumConnections</Name>
				<Value>{viewers}</Value>
				<Type>Integer</Type>
			</Property>
			<Property>
				<Name>securityPublishRequirePassword</Name>
				<Value>true</Value>
				<Type>Boolean</Type>
			</Property>
			<Property>
				<Name>streamPublisherSmilFile</Name>
				<Value>playlists_agendamentos.smil</Value>
				<Type>String</Type>
			</Property>
			<Property>
				<Name>streamPublisherPassMetaData</Name>
				<Value>true</Value>
				<Type>Boolean</Type>
			</Property>
			<Property>
				<Name>streamPublisherSwitchLog</Name>
				<Value>true</Value>
				<Type>Boolean</Type>
			</Property>
			<Property>
				<Name>securityPublishBlockDuplicateStreamNames</Name>
				<Value>false</Value>
				<Type>Boolean</Type>
			</Property>
			<Property>
				<Name>securityPublishPasswordFile</Name>
				<Value>${{com.wowza.wms.context.VHostConfigHome}}/conf/${{com.wowza.wms.context.Application}}/publish.password</Value>
				<Type>String</Type>
			</Property>
			<Property>
				<Name>loopUntilLiveSourceStreams</Name>
				<Value>live</Value>
				<Type>String</Type>
			</Property>
			<Property>
				<Name>loopUntilLiveOutputStreams</Name>
				<Value>{name}</Value>
				<Type>String</Type>
			</Property>
			<Property>
				<Name>loopUntilLiveReloadEntirePlaylist</Name>
				<Value>true</Value>
				<Type>Boolean</Type>
			</Property>
			<Property>
				<Name>loopUntilLiveHandleMediaCasters</Name>
				<Value>false</Value>
				<Type>Boolean</Type>
			</Property>
			<Property>
                <Name>pushPublishMapPath</Name>
                <Value>${{com.wowza.wms.context.VHostConfigHome}}/conf/${{com.wowza.wms.context.Application}}/PushPublishMap.txt</Value>
                <Type>String</Type>
            </Property>
		</Properties>
	</Application>
</Root>"#
    )
}
